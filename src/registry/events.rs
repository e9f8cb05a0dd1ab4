//! 注册中心事件

use super::record::ServiceRecord;

/// 注册中心事件
///
/// 事件集合是封闭的；`name()` 返回对外约定的事件名。
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Registered(ServiceRecord),
    Deregistered { id: String },
    Updated(ServiceRecord),
    Up(ServiceRecord),
    Down(ServiceRecord),
    Started,
    Stopped,
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::Registered(_) => "service:registered",
            RegistryEvent::Deregistered { .. } => "service:deregistered",
            RegistryEvent::Updated(_) => "service:updated",
            RegistryEvent::Up(_) => "service:up",
            RegistryEvent::Down(_) => "service:down",
            RegistryEvent::Started => "discovery:started",
            RegistryEvent::Stopped => "discovery:stopped",
        }
    }

    /// 事件关联的服务 ID（生命周期事件没有）
    pub fn service_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::Registered(r)
            | RegistryEvent::Updated(r)
            | RegistryEvent::Up(r)
            | RegistryEvent::Down(r) => Some(&r.id),
            RegistryEvent::Deregistered { id } => Some(id),
            RegistryEvent::Started | RegistryEvent::Stopped => None,
        }
    }
}

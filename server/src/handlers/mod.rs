// HTTP handlers module structure

pub(crate) mod dispatch_handlers;
pub(crate) mod health_handlers;
pub(crate) mod notification_handlers;

// Request gateway: validates inbound requests and hands events to the dispatch queue

pub mod dispatch;
pub mod health;
pub mod probe;
pub mod route;

//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP 请求委托给应用层的用例服务，
//! 并承载 WebSocket 实时连接的升级与帧路由。

mod error;
mod routes;
mod state;
mod ws;

pub use routes::router;
pub use state::AppState;

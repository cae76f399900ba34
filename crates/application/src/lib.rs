//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，以及聊天核心自有的两个
//! 进程内组件：连接注册表（在线连接与订阅关系）和通知总线
//! （把 HTTP 触发的业务事件送达在线连接）。持久化通过
//! repository 端口抽象，由基础设施层提供 Postgres 实现。

pub mod bus;
pub mod clock;
pub mod error;
pub mod registry;
pub mod repository;
pub mod services;

pub use bus::{EventBus, EventSubscriber, NewRoomFanout, NotifyError, UserJoinedFanout};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use registry::{ClosedConnection, ConnectionRegistry, RegistryError};
pub use repository::{
    AuthoredMessage, MembershipRepository, MessageRepository, RepositoryError, RoomRepository,
    UserRepository,
};
pub use services::{
    ChatService, ChatServiceDependencies, CreateRoomRequest, PostMessageRequest,
    RegisterUserRequest, StartDirectChatRequest, UserService, UserServiceDependencies,
};

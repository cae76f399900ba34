mod chat_service;
mod user_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use chat_service::{
    ChatService, ChatServiceDependencies, CreateRoomRequest, PostMessageRequest,
    StartDirectChatRequest,
};
pub use user_service::{RegisterUserRequest, UserService, UserServiceDependencies};

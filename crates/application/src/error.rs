use domain::DomainError;
use thiserror::Error;

use crate::bus::NotifyError;
use crate::registry::RegistryError;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
}

impl ApplicationError {
    /// 是否为领域层校验/规则错误（区别于基础设施故障）。
    pub fn domain_error(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }
}

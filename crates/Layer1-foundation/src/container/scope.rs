//! Scope & Definition - 의존성 수명과 등록 정의

use crate::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::sync::Arc;

use super::Container;

/// 타입이 지워진 인스턴스 (`Arc<T>`를 한 번 더 감싼 값)
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type SyncFactory = Arc<dyn Fn() -> Result<AnyArc> + Send + Sync>;

pub(crate) type AsyncFactory =
    Arc<dyn Fn(Container) -> BoxFuture<'static, Result<AnyArc>> + Send + Sync>;

/// 의존성 수명
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// 컨테이너 수명 동안 하나
    Singleton,
    /// 요청 경계(`clear_request_scope`)까지 하나
    Request,
    /// 매번 새로 생성
    Transient,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Request => "request",
            Self::Transient => "transient",
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::Singleton
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub(crate) enum Provider {
    Instance(AnyArc),
    Factory(SyncFactory),
    AsyncFactory(AsyncFactory),
}

impl Provider {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Instance(_) => "instance",
            Self::Factory(_) => "factory",
            Self::AsyncFactory(_) => "async_factory",
        }
    }
}

/// 인터페이스 하나에 대한 등록 정의
#[derive(Clone)]
pub(crate) struct Definition {
    pub interface: TypeId,
    pub interface_name: &'static str,
    pub name: Option<String>,
    pub scope: Scope,
    pub provider: Provider,
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("interface", &self.interface_name)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("provider", &self.provider.kind())
            .finish()
    }
}

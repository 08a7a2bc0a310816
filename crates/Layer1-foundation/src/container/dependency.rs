//! Dependency - 생성자 인자 자동 해석

use super::Container;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// 컨테이너에서 해석 가능한 생성자 인자
///
/// `Arc<T>`는 필수, `Option<Arc<T>>`는 등록이 없으면 `None`입니다.
/// 여러 인자는 튜플로 묶습니다.
#[async_trait]
pub trait Dependency: Sized + Send {
    async fn resolve(container: &Container) -> Result<Self>;
}

#[async_trait]
impl<T> Dependency for Arc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    async fn resolve(container: &Container) -> Result<Self> {
        container.resolve::<T>().await
    }
}

#[async_trait]
impl<T> Dependency for Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    async fn resolve(container: &Container) -> Result<Self> {
        match container.resolve::<T>().await {
            Ok(instance) => Ok(Some(instance)),
            Err(Error::NoRegistration { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Dependency for () {
    async fn resolve(_container: &Container) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_dependency_tuple {
    ($($name:ident),+) => {
        #[async_trait]
        impl<$($name),+> Dependency for ($($name,)+)
        where
            $($name: Dependency + 'static),+
        {
            async fn resolve(container: &Container) -> Result<Self> {
                Ok(($(<$name as Dependency>::resolve(container).await?,)+))
            }
        }
    };
}

impl_dependency_tuple!(A);
impl_dependency_tuple!(A, B);
impl_dependency_tuple!(A, B, C);
impl_dependency_tuple!(A, B, C, D);
impl_dependency_tuple!(A, B, C, D, E);
impl_dependency_tuple!(A, B, C, D, E, F);

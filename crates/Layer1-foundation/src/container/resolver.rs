//! Container - 스코프 기반 의존성 해석

use super::dependency::Dependency;
use super::scope::{AnyArc, AsyncFactory, Definition, Provider, Scope, SyncFactory};
use crate::{Error, Result};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 캐시는 인터페이스 단위 (이름 있는 정의도 같은 인스턴스를 공유)
type CacheKey = TypeId;

#[derive(Default)]
struct Inner {
    definitions: RwLock<HashMap<TypeId, Vec<Definition>>>,
    singletons: RwLock<HashMap<CacheKey, AnyArc>>,
    request: RwLock<HashMap<CacheKey, AnyArc>>,
}

#[derive(Clone)]
struct ChainEntry {
    interface: TypeId,
    label: String,
}

/// 의존성 주입 컨테이너
///
/// 복제 비용이 낮은 핸들입니다. 팩토리는 현재 해석 경로를 담은 핸들을
/// 받으므로, 같은 호출 스택에서 이미 해석 중인 인터페이스를 다시 요청하면
/// `CircularDependency` 에러가 납니다.
///
/// 이름 없이 해석하면 가장 마지막에 등록된 정의가 쓰입니다.
/// 싱글톤/요청 캐시는 인터페이스당 하나이므로, 한 번 만들어진 싱글톤은
/// 같은 인터페이스를 다시 등록해도 새로 만들어지지 않습니다 (`unregister`로 비움).
///
/// ```ignore
/// let container = Container::new();
/// container.register_instance::<dyn MemoryClient>(client);
/// container.register_constructor::<Service, (Arc<dyn MemoryClient>,), _>(
///     Scope::Singleton,
///     None,
///     |(client,)| Arc::new(Service::new(client)),
/// );
///
/// let service = container.resolve::<Service>().await?;
/// ```
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<Inner>,
    chain: Arc<Vec<ChainEntry>>,
}

impl Container {
    /// 빈 컨테이너 생성
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 기존 인스턴스 등록 (싱글톤 캐시에 바로 들어감)
    pub fn register_instance<T>(&self, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased: AnyArc = Arc::new(instance);
        self.inner
            .singletons
            .write()
            .insert(TypeId::of::<T>(), Arc::clone(&erased));
        self.add_definition::<T>(Scope::Singleton, None, Provider::Instance(erased));
    }

    /// 동기 팩토리 등록
    pub fn register_factory<T, F>(&self, scope: Scope, name: Option<&str>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let factory: SyncFactory = Arc::new(move || -> Result<AnyArc> {
            let instance = factory()?;
            Ok(Arc::new(instance) as AnyArc)
        });
        self.add_definition::<T>(scope, name, Provider::Factory(factory));
    }

    /// 비동기 팩토리 등록
    ///
    /// 팩토리는 다른 의존성을 해석할 수 있는 컨테이너 핸들을 받습니다.
    pub fn register_async_factory<T, F, Fut>(&self, scope: Scope, name: Option<&str>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>>> + Send + 'static,
    {
        let factory: AsyncFactory = Arc::new(
            move |container: Container| -> BoxFuture<'static, Result<AnyArc>> {
                let fut = factory(container);
                Box::pin(async move {
                    let instance = fut.await?;
                    Ok::<AnyArc, Error>(Arc::new(instance))
                })
            },
        );
        self.add_definition::<T>(scope, name, Provider::AsyncFactory(factory));
    }

    /// 생성자 등록
    ///
    /// `D`는 `Arc<U>`, `Option<Arc<U>>` 또는 그 튜플이며, 호출 전에
    /// 컨테이너에서 해석됩니다. `Option`은 등록이 없을 때만 `None`이 됩니다.
    pub fn register_constructor<T, D, F>(&self, scope: Scope, name: Option<&str>, constructor: F)
    where
        T: ?Sized + Send + Sync + 'static,
        D: Dependency + 'static,
        F: Fn(D) -> Arc<T> + Send + Sync + 'static,
    {
        let constructor = Arc::new(constructor);
        self.register_async_factory::<T, _, _>(scope, name, move |container| {
            let constructor = Arc::clone(&constructor);
            async move {
                let deps = D::resolve(&container).await?;
                Ok::<_, Error>(constructor(deps))
            }
        });
    }

    fn add_definition<T>(&self, scope: Scope, name: Option<&str>, provider: Provider)
    where
        T: ?Sized + 'static,
    {
        let definition = Definition {
            interface: TypeId::of::<T>(),
            interface_name: std::any::type_name::<T>(),
            name: name.map(str::to_string),
            scope,
            provider,
        };

        debug!(
            interface = definition.interface_name,
            name = ?definition.name,
            scope = %scope,
            provider = definition.provider.kind(),
            "Registering dependency"
        );

        let mut definitions = self.inner.definitions.write();
        let list = definitions.entry(definition.interface).or_default();
        if let Some(ref name) = definition.name {
            list.retain(|d| d.name.as_deref() != Some(name.as_str()));
        }
        list.push(definition);
    }

    // ========================================================================
    // 해석
    // ========================================================================

    /// 기본(마지막 등록) 정의로 해석
    pub async fn resolve<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_inner::<T>(None).await
    }

    /// 이름 있는 정의로 해석
    pub async fn resolve_named<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_inner::<T>(Some(name)).await
    }

    /// 인터페이스의 모든 정의를 등록 순서대로 해석
    ///
    /// 해석에 실패한 정의는 로그를 남기고 건너뜁니다.
    pub async fn resolve_all<T>(&self) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let definitions = self.definitions_of(TypeId::of::<T>());
        let mut instances = Vec::with_capacity(definitions.len());

        for definition in definitions {
            match self.resolve_definition::<T>(definition).await {
                Ok(instance) => instances.push(instance),
                Err(e) => warn!(
                    interface = std::any::type_name::<T>(),
                    error = %e,
                    "Failed to resolve registered dependency"
                ),
            }
        }

        instances
    }

    async fn resolve_inner<T>(&self, name: Option<&str>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let interface = TypeId::of::<T>();
        let interface_name = std::any::type_name::<T>();

        let definitions = self.definitions_of(interface);
        if definitions.is_empty() {
            return Err(Error::no_registration(interface_name, name));
        }

        let definition = match name {
            Some(name) => definitions
                .into_iter()
                .find(|d| d.name.as_deref() == Some(name))
                .ok_or_else(|| Error::no_registration(interface_name, Some(name)))?,
            None => definitions
                .into_iter()
                .last()
                .ok_or_else(|| Error::no_registration(interface_name, None))?,
        };

        self.resolve_definition::<T>(definition).await
    }

    async fn resolve_definition<T>(&self, definition: Definition) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if self.chain.iter().any(|e| e.interface == definition.interface) {
            let mut path: Vec<&str> = self.chain.iter().map(|e| e.label.as_str()).collect();
            path.push(definition.interface_name);
            return Err(Error::CircularDependency(path.join(" -> ")));
        }

        let key: CacheKey = definition.interface;

        let erased = match definition.scope {
            Scope::Singleton => self.cached(&self.inner.singletons, key, &definition).await?,
            Scope::Request => self.cached(&self.inner.request, key, &definition).await?,
            Scope::Transient => self.construct(&definition).await?,
        };

        erased.downcast_ref::<Arc<T>>().cloned().ok_or_else(|| {
            Error::Internal(format!(
                "Registered value does not match interface {}",
                definition.interface_name
            ))
        })
    }

    async fn cached(
        &self,
        cache: &RwLock<HashMap<CacheKey, AnyArc>>,
        key: CacheKey,
        definition: &Definition,
    ) -> Result<AnyArc> {
        let hit = cache.read().get(&key).cloned();
        if let Some(hit) = hit {
            trace!(interface = definition.interface_name, "Dependency cache hit");
            return Ok(hit);
        }

        let created = self.construct(definition).await?;

        // 동시 생성 경쟁 시 먼저 들어간 인스턴스 유지
        let mut cache = cache.write();
        Ok(Arc::clone(cache.entry(key).or_insert(created)))
    }

    async fn construct(&self, definition: &Definition) -> Result<AnyArc> {
        trace!(
            interface = definition.interface_name,
            scope = %definition.scope,
            "Constructing dependency"
        );

        match &definition.provider {
            Provider::Instance(instance) => Ok(Arc::clone(instance)),
            Provider::Factory(factory) => factory(),
            Provider::AsyncFactory(factory) => factory(self.enter(definition)).await,
        }
    }

    fn enter(&self, definition: &Definition) -> Container {
        let label = match definition.name {
            Some(ref name) => format!("{}[{}]", definition.interface_name, name),
            None => definition.interface_name.to_string(),
        };

        let mut chain = (*self.chain).clone();
        chain.push(ChainEntry {
            interface: definition.interface,
            label,
        });

        Container {
            inner: Arc::clone(&self.inner),
            chain: Arc::new(chain),
        }
    }

    fn definitions_of(&self, interface: TypeId) -> Vec<Definition> {
        self.inner
            .definitions
            .read()
            .get(&interface)
            .cloned()
            .unwrap_or_default()
    }

    // ========================================================================
    // 관리
    // ========================================================================

    /// 등록 여부 확인
    pub fn has<T>(&self, name: Option<&str>) -> bool
    where
        T: ?Sized + 'static,
    {
        let definitions = self.inner.definitions.read();
        match definitions.get(&TypeId::of::<T>()) {
            Some(list) => match name {
                Some(name) => list.iter().any(|d| d.name.as_deref() == Some(name)),
                None => !list.is_empty(),
            },
            None => false,
        }
    }

    /// 등록 해제
    ///
    /// 이름이 없으면 인터페이스의 모든 정의를 제거합니다. 어느 경우든
    /// 해당 인터페이스의 캐시된 싱글톤은 모두 비워집니다.
    pub fn unregister<T>(&self, name: Option<&str>) -> bool
    where
        T: ?Sized + 'static,
    {
        let interface = TypeId::of::<T>();

        let removed = {
            let mut definitions = self.inner.definitions.write();
            match name {
                Some(name) => match definitions.get_mut(&interface) {
                    Some(list) => {
                        let before = list.len();
                        list.retain(|d| d.name.as_deref() != Some(name));
                        let removed = list.len() != before;
                        if list.is_empty() {
                            definitions.remove(&interface);
                        }
                        removed
                    }
                    None => false,
                },
                None => definitions
                    .remove(&interface)
                    .map(|list| !list.is_empty())
                    .unwrap_or(false),
            }
        };

        self.inner
            .singletons
            .write()
            .remove(&interface);

        if removed {
            debug!(
                interface = std::any::type_name::<T>(),
                name = ?name,
                "Unregistered dependency"
            );
        }

        removed
    }

    /// 요청 스코프 캐시 비우기
    pub fn clear_request_scope(&self) {
        let mut request = self.inner.request.write();
        if !request.is_empty() {
            trace!(count = request.len(), "Clearing request scope");
        }
        request.clear();
    }

    /// 범위를 벗어나면 요청 스코프를 비우는 가드
    pub fn request_scope(&self) -> RequestScope {
        RequestScope {
            container: self.clone(),
        }
    }

    /// 정의만 복사한 자식 컨테이너 생성 (캐시는 공유하지 않음)
    ///
    /// 자식에 대한 등록 변경은 부모에 영향을 주지 않습니다.
    pub fn create_child_container(&self) -> Container {
        let definitions = self.inner.definitions.read().clone();
        Container {
            inner: Arc::new(Inner {
                definitions: RwLock::new(definitions),
                ..Default::default()
            }),
            chain: Arc::new(Vec::new()),
        }
    }

    /// 등록된 인터페이스 수
    pub fn len(&self) -> usize {
        self.inner.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("interfaces", &self.len())
            .field("depth", &self.chain.len())
            .finish()
    }
}

/// 요청 스코프 가드
///
/// drop 시 `clear_request_scope`를 호출합니다.
pub struct RequestScope {
    container: Container,
}

impl RequestScope {
    pub fn container(&self) -> &Container {
        &self.container
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.container.clear_request_scope();
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Logger: Send + Sync {
        fn prefix(&self) -> String;
    }

    struct ConsoleLogger(String);

    impl Logger for ConsoleLogger {
        fn prefix(&self) -> String {
            self.0.clone()
        }
    }

    #[derive(Debug)]
    struct Counter {
        id: usize,
    }

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    fn counter() -> Result<Arc<Counter>> {
        Ok(Arc::new(Counter {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        }))
    }

    #[tokio::test]
    async fn test_singleton_identity() {
        let container = Container::new();
        container.register_factory::<dyn Logger, _>(Scope::Singleton, None, || {
            Ok(Arc::new(ConsoleLogger("app".into())) as Arc<dyn Logger>)
        });

        let a = container.resolve::<dyn Logger>().await.unwrap();
        let b = container.resolve::<dyn Logger>().await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.prefix(), "app");
    }

    #[tokio::test]
    async fn test_transient_distinct() {
        let container = Container::new();
        container.register_factory::<Counter, _>(Scope::Transient, None, counter);

        let a = container.resolve::<Counter>().await.unwrap();
        let b = container.resolve::<Counter>().await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_request_scope() {
        let container = Container::new();
        container.register_factory::<Counter, _>(Scope::Request, None, counter);

        let a = container.resolve::<Counter>().await.unwrap();
        let b = container.resolve::<Counter>().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        container.clear_request_scope();
        let c = container.resolve::<Counter>().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        {
            let _scope = container.request_scope();
        }
        let d = container.resolve::<Counter>().await.unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
    }

    #[tokio::test]
    async fn test_register_instance() {
        let container = Container::new();
        let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger("given".into()));
        container.register_instance::<dyn Logger>(logger.clone());

        let resolved = container.resolve::<dyn Logger>().await.unwrap();
        assert!(Arc::ptr_eq(&logger, &resolved));
    }

    #[tokio::test]
    async fn test_no_registration() {
        let container = Container::new();
        let err = container.resolve::<Counter>().await.unwrap_err();
        assert!(matches!(err, Error::NoRegistration { name: None, .. }));

        container.register_factory::<Counter, _>(Scope::Transient, Some("a"), counter);
        let err = container.resolve_named::<Counter>("b").await.unwrap_err();
        assert!(err.to_string().contains("with name 'b'"));
    }

    #[tokio::test]
    async fn test_named_and_last_registered_default() {
        let container = Container::new();
        let make = |prefix: &'static str| {
            move || Ok(Arc::new(ConsoleLogger(prefix.into())) as Arc<dyn Logger>)
        };

        container.register_factory::<dyn Logger, _>(Scope::Transient, Some("file"), make("file"));
        container.register_factory::<dyn Logger, _>(Scope::Transient, Some("console"), make("console"));

        assert_eq!(container.resolve::<dyn Logger>().await.unwrap().prefix(), "console");
        assert_eq!(
            container.resolve_named::<dyn Logger>("file").await.unwrap().prefix(),
            "file"
        );

        // 같은 이름 재등록은 교체 후 기본값이 됨
        container.register_factory::<dyn Logger, _>(Scope::Transient, Some("file"), make("file-v2"));
        assert_eq!(container.resolve::<dyn Logger>().await.unwrap().prefix(), "file-v2");
        assert_eq!(container.resolve_all::<dyn Logger>().await.len(), 2);
    }

    #[tokio::test]
    async fn test_singleton_survives_reregistration() {
        let container = Container::new();
        container.register_factory::<Counter, _>(Scope::Singleton, None, counter);
        let first = container.resolve::<Counter>().await.unwrap();

        container.register_factory::<Counter, _>(Scope::Singleton, Some("alt"), counter);
        let second = container.resolve::<Counter>().await.unwrap();
        let named = container.resolve_named::<Counter>("alt").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &named));
        assert_eq!(second.id, first.id);
    }

    #[derive(Debug)]
    struct ServiceA {
        _b: Arc<ServiceB>,
    }

    #[derive(Debug)]
    struct ServiceB {
        _a: Arc<ServiceA>,
    }

    #[tokio::test]
    async fn test_circular_dependency() {
        let container = Container::new();
        container.register_constructor::<ServiceA, (Arc<ServiceB>,), _>(
            Scope::Singleton,
            None,
            |(b,)| Arc::new(ServiceA { _b: b }),
        );
        container.register_constructor::<ServiceB, (Arc<ServiceA>,), _>(
            Scope::Singleton,
            None,
            |(a,)| Arc::new(ServiceB { _a: a }),
        );

        let err = container.resolve::<ServiceA>().await.unwrap_err();
        match err {
            Error::CircularDependency(path) => {
                assert!(path.contains("ServiceA"));
                assert!(path.contains("ServiceB"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct Reporter {
        logger: Arc<dyn Logger>,
        counter: Option<Arc<Counter>>,
    }

    #[tokio::test]
    async fn test_constructor_wiring() {
        let container = Container::new();
        container.register_instance::<dyn Logger>(Arc::new(ConsoleLogger("wired".into())));
        container.register_constructor::<Reporter, (Arc<dyn Logger>, Option<Arc<Counter>>), _>(
            Scope::Transient,
            None,
            |(logger, counter)| Arc::new(Reporter { logger, counter }),
        );

        let reporter = container.resolve::<Reporter>().await.unwrap();
        assert_eq!(reporter.logger.prefix(), "wired");
        assert!(reporter.counter.is_none());

        container.register_factory::<Counter, _>(Scope::Singleton, None, counter);
        let reporter = container.resolve::<Reporter>().await.unwrap();
        assert!(reporter.counter.is_some());
    }

    #[tokio::test]
    async fn test_unregister_evicts_singleton() {
        let container = Container::new();
        container.register_factory::<Counter, _>(Scope::Singleton, None, counter);
        let first = container.resolve::<Counter>().await.unwrap();

        assert!(container.has::<Counter>(None));
        assert!(container.unregister::<Counter>(None));
        assert!(!container.has::<Counter>(None));
        assert!(!container.unregister::<Counter>(None));

        container.register_factory::<Counter, _>(Scope::Singleton, None, counter);
        let second = container.resolve::<Counter>().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_child_container() {
        let parent = Container::new();
        parent.register_factory::<Counter, _>(Scope::Singleton, None, counter);
        let from_parent = parent.resolve::<Counter>().await.unwrap();

        let child = parent.create_child_container();
        let from_child = child.resolve::<Counter>().await.unwrap();
        assert!(!Arc::ptr_eq(&from_parent, &from_child));

        child.register_instance::<dyn Logger>(Arc::new(ConsoleLogger("child".into())));
        assert!(child.has::<dyn Logger>(None));
        assert!(!parent.has::<dyn Logger>(None));
    }
}

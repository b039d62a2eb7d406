//! 处理器注册表
//!
//! - `HandlerCatalog`：启动期显式注册的「事件类型 → 处理器工厂」表，进程级共享；
//! - `HandlerRegistry`：由 catalog 在每个执行作用域新建的只读快照，
//!   查找时用工厂构造新的处理器实例。
//!
//! 延迟重投时只能凭身份键找回「同一个逻辑处理器」；找不到即配置漂移。
//!
use super::handler::{ErasedHandler, EventHandler, HandlerContext, InvokeError, TypedHandler};
use super::identity::{HandlerKey, key_of};
use super::retry::RetryPolicy;
use crate::error::{DispatchError, DispatchResult};
use crate::event::IntegrationEvent;
use dashmap::DashMap;
use serde_json::Value;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type HandlerFactory = Arc<dyn Fn() -> Box<dyn ErasedHandler> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct HandlerEntry {
    key: HandlerKey,
    name: &'static str,
    retry: Option<RetryPolicy>,
    factory: HandlerFactory,
}

impl HandlerEntry {
    fn resolve(&self) -> ResolvedHandler {
        ResolvedHandler {
            key: self.key.clone(),
            name: self.name,
            retry: self.retry.clone(),
            handler: (self.factory)(),
        }
    }
}

/// 处理器登记表（按事件类型分组，组内保持注册顺序）
///
/// 每个事件类型对应一个不可变切片，修改时整体替换，
/// 因此已建立的作用域快照不受后续注册/注销影响。
#[derive(Default)]
pub struct HandlerCatalog {
    by_kind: DashMap<String, Arc<[HandlerEntry]>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器工厂，返回处理器身份键
    pub fn register<E, H>(
        &self,
        factory: impl Fn() -> H + Send + Sync + 'static,
    ) -> DispatchResult<HandlerKey>
    where
        E: IntegrationEvent,
        H: EventHandler<E>,
    {
        self.insert::<E, H>(Box::new(factory), None)
    }

    /// 注册处理器工厂，并为其单独指定重试策略
    pub fn register_with_retry<E, H>(
        &self,
        factory: impl Fn() -> H + Send + Sync + 'static,
        retry: RetryPolicy,
    ) -> DispatchResult<HandlerKey>
    where
        E: IntegrationEvent,
        H: EventHandler<E>,
    {
        retry.validate()?;
        self.insert::<E, H>(Box::new(factory), Some(retry))
    }

    /// 注册可由 `Default` 构造的处理器
    pub fn register_default<E, H>(&self) -> DispatchResult<HandlerKey>
    where
        E: IntegrationEvent,
        H: EventHandler<E> + Default,
    {
        self.register::<E, H>(H::default)
    }

    fn insert<E, H>(
        &self,
        factory: Box<dyn Fn() -> H + Send + Sync>,
        retry: Option<RetryPolicy>,
    ) -> DispatchResult<HandlerKey>
    where
        E: IntegrationEvent,
        H: EventHandler<E>,
    {
        let key = key_of::<H>();
        let name = type_name::<H>();

        let mut slot = self
            .by_kind
            .entry(E::KIND.to_string())
            .or_insert_with(|| Arc::from(Vec::new()));

        if let Some(existing) = slot.iter().find(|e| e.key == key) {
            return Err(if existing.name == name {
                DispatchError::HandlerAlreadyRegistered {
                    kind: E::KIND.to_string(),
                    handler: name.to_string(),
                }
            } else {
                DispatchError::HandlerKeyCollision {
                    kind: E::KIND.to_string(),
                    key: key.to_string(),
                    existing: existing.name.to_string(),
                    incoming: name.to_string(),
                }
            });
        }

        let factory: HandlerFactory = Arc::new(move || -> Box<dyn ErasedHandler> {
            Box::new(TypedHandler::<E, H>::new(factory()))
        });

        let mut entries = slot.to_vec();
        entries.push(HandlerEntry {
            key: key.clone(),
            name,
            retry,
            factory,
        });
        *slot = Arc::from(entries);

        Ok(key)
    }

    /// 注销处理器；返回是否确有注销
    pub fn unregister<E, H>(&self) -> bool
    where
        E: IntegrationEvent,
        H: 'static,
    {
        let key = key_of::<H>();
        let Some(mut slot) = self.by_kind.get_mut(E::KIND) else {
            return false;
        };

        let remaining: Vec<HandlerEntry> = slot.iter().filter(|e| e.key != key).cloned().collect();
        if remaining.len() == slot.len() {
            return false;
        }
        *slot = Arc::from(remaining);
        true
    }

    /// 为一次执行建立新的作用域
    pub fn scope(&self) -> HandlerRegistry {
        let by_kind = self
            .by_kind
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        HandlerRegistry { by_kind }
    }

    /// 已登记的事件类型
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .by_kind
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        kinds.sort();
        kinds
    }
}

/// 单个执行作用域内的只读处理器注册表
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    by_kind: HashMap<String, Arc<[HandlerEntry]>>,
}

impl HandlerRegistry {
    /// 按注册顺序返回该事件类型的全部处理器实例
    pub fn handlers_for(&self, kind: &str) -> Vec<ResolvedHandler> {
        self.by_kind
            .get(kind)
            .map(|entries| entries.iter().map(HandlerEntry::resolve).collect())
            .unwrap_or_default()
    }

    /// 按 (事件类型, 身份键) 找回处理器实例
    pub fn handler_matching(&self, kind: &str, key: &HandlerKey) -> Option<ResolvedHandler> {
        self.by_kind
            .get(kind)?
            .iter()
            .find(|e| &e.key == key)
            .map(HandlerEntry::resolve)
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(|entries| entries.is_empty())
    }
}

/// 作用域内构造出的处理器实例
pub struct ResolvedHandler {
    key: HandlerKey,
    name: &'static str,
    retry: Option<RetryPolicy>,
    handler: Box<dyn ErasedHandler>,
}

impl ResolvedHandler {
    pub fn key(&self) -> &HandlerKey {
        &self.key
    }

    /// 处理器完整类型名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 注册时指定的重试策略（未指定时使用全局策略）
    pub fn retry_override(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub(crate) async fn invoke(
        &self,
        ctx: &HandlerContext,
        payload: &Value,
    ) -> Result<(), InvokeError> {
        self.handler.invoke(ctx, payload).await
    }
}

impl fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

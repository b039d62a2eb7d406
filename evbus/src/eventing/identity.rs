//! 处理器身份（HandlerKey）
//!
//! 跨越执行边界时无法携带处理器实例，只能携带一个稳定的身份键：
//! 取处理器完整类型名的 SHA-256 摘要前 6 字节，编码为 12 位大写十六进制。
//! 同一构建产物在进程重启前后得到相同的键；结果按 `TypeId` 缓存于进程级并发表。
//!
use crate::error::{DispatchError, DispatchResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::LazyLock;

const KEY_BYTES: usize = 6;
const KEY_LEN: usize = KEY_BYTES * 2;

static KEY_CACHE: LazyLock<DashMap<TypeId, HandlerKey>> = LazyLock::new(DashMap::new);

/// 处理器身份键
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HandlerKey(String);

impl HandlerKey {
    /// 由完整类型名推导身份键（纯函数，不经过缓存）
    pub fn from_type_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        Self(hex::encode_upper(&digest[..KEY_BYTES]))
    }

    /// 解析外部传入的身份键（例如从持久化作业中恢复）
    pub fn parse(raw: &str) -> DispatchResult<Self> {
        if raw.len() != KEY_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DispatchError::InvalidHandlerKey(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HandlerKey {
    type Error = DispatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HandlerKey> for String {
    fn from(key: HandlerKey) -> Self {
        key.0
    }
}

/// 获取处理器类型 `H` 的身份键（带进程级缓存）
pub fn key_of<H: ?Sized + 'static>() -> HandlerKey {
    let id = TypeId::of::<H>();
    if let Some(key) = KEY_CACHE.get(&id) {
        return key.value().clone();
    }
    KEY_CACHE
        .entry(id)
        .or_insert_with(|| HandlerKey::from_type_name(type_name::<H>()))
        .value()
        .clone()
}

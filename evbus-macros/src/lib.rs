use proc_macro::TokenStream;

mod integration_event;
mod utils;

/// 集成事件宏
/// - 合并默认派生：`Debug, Clone, serde::Serialize, serde::Deserialize`（与已有 derive 去重）
/// - 为目标类型实现 `::evbus::event::IntegrationEvent`
/// - 支持参数：`#[integration_event(kind = "...")]`，默认取类型名
/// - 可用于结构体与枚举
#[proc_macro_attribute]
pub fn integration_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    integration_event::expand(attr, item)
}

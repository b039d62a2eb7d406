use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::{ToTokens, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[integration_event] 宏实现
/// - 支持结构体与枚举
/// - 生成 `::evbus::event::IntegrationEvent` 实现，`KIND` 取 `kind = "..."` 或类型名
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let (attrs, ident, generics) = match &mut input {
        Item::Struct(s) => (&mut s.attrs, s.ident.clone(), s.generics.clone()),
        Item::Enum(e) => (&mut e.attrs, e.ident.clone(), e.generics.clone()),
        other => {
            return syn::Error::new(
                other.span(),
                "#[integration_event] can only be used on struct or enum types",
            )
            .to_compile_error()
            .into();
        }
    };

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    apply_derives(attrs, required);

    let kind = cfg
        .kind
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));
    if kind.value().trim().is_empty() {
        return syn::Error::new(kind.span(), "'kind' must not be empty")
            .to_compile_error()
            .into();
    }

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let expanded = quote! {
        #input

        impl #impl_generics ::evbus::event::IntegrationEvent for #ident #ty_generics #where_clause {
            const KIND: &'static str = #kind;
        }
    };

    TokenStream::from(expanded)
}

// 宏参数：kind = "<string>"
struct EventAttrConfig {
    kind: Option<syn::LitStr>,
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut kind: Option<syn::LitStr> = None;

        if input.is_empty() {
            return Ok(Self { kind });
        }

        let pairs: Punctuated<syn::ExprAssign, Token![,]> =
            Punctuated::<syn::ExprAssign, Token![,]>::parse_terminated(input)?;

        for assign in pairs.into_iter() {
            let key_ident = match *assign.left {
                syn::Expr::Path(p) if p.path.segments.len() == 1 => {
                    p.path.segments[0].ident.clone()
                }
                other => return Err(syn::Error::new(other.span(), "invalid attribute key")),
            };
            match key_ident.to_string().as_str() {
                "kind" => {
                    if kind.is_some() {
                        return Err(syn::Error::new(
                            key_ident.span(),
                            "duplicate key 'kind' in attribute",
                        ));
                    }
                    let lit: syn::LitStr = syn::parse2(assign.right.to_token_stream())?;
                    kind = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(
                        key_ident.span(),
                        "unknown key; expected 'kind'",
                    ));
                }
            }
        }

        Ok(Self { kind })
    }
}

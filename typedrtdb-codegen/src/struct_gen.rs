use proc_macro2::{Ident, TokenStream};
use quote::quote;
use std::collections::{BTreeMap, BTreeSet};
use typedrtdb::schema::{Field, Shape};

use crate::type_utils::{
    element_struct_name, field_struct_name, leaf_type, nullable_member, partial_struct_name,
    safe_field_ident, type_ident, ROOT_STRUCT_NAME,
};

/// Generate value structs and partial structs for every fixed object in the
/// schema. A root that is not a fixed object gets a `Root` type alias.
pub fn generate_structs(schema: &Shape) -> TokenStream {
    let mut gen = StructGen::default();
    let root_type = gen.rust_type(schema, ROOT_STRUCT_NAME, "");

    let mut tokens = gen.tokens;
    if !matches!(schema, Shape::Fixed(_)) {
        let root_ident = type_ident(ROOT_STRUCT_NAME);
        tokens.extend(quote! {
            /// The database root.
            pub type #root_ident = #root_type;
        });
    }
    tokens
}

#[derive(Default)]
struct StructGen {
    used_names: BTreeSet<String>,
    tokens: TokenStream,
}

impl StructGen {
    /// The Rust type for `shape` at path pattern `at`, emitting structs for
    /// any fixed objects inside it. `name` is the struct name to use if
    /// `shape` itself is a fixed object.
    fn rust_type(&mut self, shape: &Shape, name: &str, at: &str) -> TokenStream {
        match shape {
            Shape::Leaf(kind) => leaf_type(*kind),
            Shape::Fixed(fields) => {
                let ident = self.emit_struct(fields, name, at);
                quote! { #ident }
            }
            Shape::Dynamic(value) => {
                let inner = self.rust_type(value, &element_struct_name(name), &join(at, "*"));
                quote! { std::collections::HashMap<String, #inner> }
            }
            Shape::List(element) => {
                let inner = self.rust_type(element, &element_struct_name(name), &join(at, "#"));
                quote! { Vec<#inner> }
            }
            Shape::Union(_) => match nullable_member(shape) {
                Some(inner) => {
                    let inner = self.rust_type(inner, name, at);
                    quote! { Option<#inner> }
                }
                None => quote! { serde_json::Value },
            },
        }
    }

    fn emit_struct(&mut self, fields: &BTreeMap<String, Field>, name: &str, at: &str) -> Ident {
        let name = self.unique_name(name);
        let ident = type_ident(&name);
        let partial_ident = type_ident(&partial_struct_name(&name));

        let mut full_fields = Vec::new();
        let mut partial_fields = Vec::new();

        for (field_name, field) in fields {
            let field_ident = safe_field_ident(field_name);
            let base = self.rust_type(&field.shape, &field_struct_name(&name, field_name), &join(at, field_name));
            let rename = rename_attr(&field_ident, field_name);
            let nullable = nullable_member(&field.shape).is_some();

            let (ty, attrs) = if field.optional && !nullable {
                (
                    quote! { Option<#base> },
                    quote! { #[serde(default, skip_serializing_if = "Option::is_none")] },
                )
            } else if nullable {
                (
                    base.clone(),
                    quote! { #[serde(default, skip_serializing_if = "Option::is_none")] },
                )
            } else if matches!(field.shape, Shape::Dynamic(_) | Shape::List(_)) {
                // Empty containers are never stored
                (base.clone(), quote! { #[serde(default)] })
            } else {
                (base.clone(), quote! {})
            };

            full_fields.push(quote! {
                #rename
                #attrs
                pub #field_ident: #ty,
            });
            partial_fields.push(quote! {
                #rename
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub #field_ident: Option<#base>,
            });
        }

        let doc = if at.is_empty() {
            " The database root.".to_string()
        } else {
            format!(" Value at `{at}`.")
        };
        let partial_doc = format!(" Update entries for {name}; unset fields are left untouched.");

        self.tokens.extend(quote! {
            #[doc = #doc]
            #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
            pub struct #ident {
                #(#full_fields)*
            }

            #[doc = #partial_doc]
            #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
            pub struct #partial_ident {
                #(#partial_fields)*
            }
        });

        ident
    }

    fn unique_name(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 2;
        while self.used_names.contains(&candidate) {
            candidate = format!("{name}{n}");
            n += 1;
        }
        self.used_names.insert(candidate.clone());
        candidate
    }
}

fn rename_attr(ident: &Ident, field_name: &str) -> Option<TokenStream> {
    let ident_str = ident.to_string();
    if ident_str.starts_with("r#") || ident_str != field_name {
        Some(quote! { #[serde(rename = #field_name)] })
    } else {
        None
    }
}

fn join(at: &str, segment: &str) -> String {
    if at.is_empty() {
        segment.to_string()
    } else {
        format!("{at}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typedrtdb::schema::parse_schema_str;

    fn generate(yaml: &str) -> String {
        generate_structs(&parse_schema_str(yaml).unwrap()).to_string()
    }

    #[test]
    fn test_dynamic_children_are_singular_structs() {
        let code = generate(
            r#"
users:
  "*":
    name: string
    score: number
"#,
        );
        assert!(code.contains("pub struct Root"));
        assert!(code.contains("pub struct User "));
        assert!(code.contains("pub struct UserPartial"));
        assert!(code.contains("pub users : std :: collections :: HashMap < String , User >"));
        assert!(code.contains("pub name : String"));
        assert!(code.contains("pub score : f64"));
    }

    #[test]
    fn test_optional_and_nullable_fields() {
        let code = generate(
            r#"
profile:
  nickname?: string
  status: string | null
  tags: [string]
"#,
        );
        assert!(code.contains("pub nickname : Option < String >"));
        assert!(code.contains("pub status : Option < String >"));
        assert!(code.contains("pub tags : Vec < String >"));
        assert!(code.contains("skip_serializing_if"));
    }

    #[test]
    fn test_nested_struct_names() {
        let code = generate(
            r#"
users:
  "*":
    stats:
      wins: number
    tags:
      - label: string
"#,
        );
        assert!(code.contains("pub struct UserStats "));
        assert!(code.contains("pub struct UserTag "));
        assert!(code.contains("pub tags : Vec < UserTag >"));
    }

    #[test]
    fn test_partial_fields_are_options() {
        let code = generate("settings:\n  theme: string\n  volume?: number\n");
        assert!(code.contains("pub struct SettingsPartial"));
        assert!(code.contains("pub theme : Option < String >"));
        assert!(code.contains("pub volume : Option < f64 >"));
    }

    #[test]
    fn test_renamed_fields() {
        let code = generate("item:\n  displayName: string\n  type: string\n");
        assert!(code.contains("rename = \"displayName\""));
        assert!(code.contains("rename = \"type\""));
        assert!(code.contains("pub display_name : String"));
    }

    #[test]
    fn test_non_object_root_alias() {
        let code = generate("\"*\": number\n");
        assert!(code.contains("pub type Root = std :: collections :: HashMap < String , f64 >"));
    }

    #[test]
    fn test_mixed_union_is_json_value() {
        let code = generate("v: string | number\n");
        assert!(code.contains("pub v : serde_json :: Value"));
    }

    #[test]
    fn test_name_collisions_get_suffix() {
        let code = generate(
            r#"
users:
  "*":
    name: string
user:
  id: string
"#,
        );
        assert!(code.contains("pub struct User "));
        assert!(code.contains("pub struct User2 "));
    }
}

use heck::{ToPascalCase, ToSnakeCase};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use typedrtdb::schema::{LeafKind, Shape};

/// Name of the struct generated for the schema root.
pub const ROOT_STRUCT_NAME: &str = "Root";

/// Struct name for a named field, prefixed by the owning struct unless the
/// owner is the root.
/// e.g. ("Root", "settings") -> "Settings", ("User", "stats") -> "UserStats"
pub fn field_struct_name(owner: &str, field_name: &str) -> String {
    let field = field_name.to_pascal_case();
    if owner == ROOT_STRUCT_NAME {
        field
    } else {
        format!("{owner}{field}")
    }
}

/// Struct name for the children of a dynamic container or list.
/// e.g. "Users" -> "User", "UserTags" -> "UserTag"
pub fn element_struct_name(container: &str) -> String {
    singularize(&container.to_snake_case()).to_pascal_case()
}

/// Generate a partial struct name.
/// e.g. "User" -> "UserPartial"
pub fn partial_struct_name(struct_name: &str) -> String {
    format!("{}Partial", struct_name)
}

/// The Rust type for a primitive leaf.
pub fn leaf_type(kind: LeafKind) -> TokenStream {
    match kind {
        LeafKind::String => quote! { String },
        LeafKind::Number => quote! { f64 },
        LeafKind::Boolean => quote! { bool },
        LeafKind::Null => quote! { () },
    }
}

/// The non-null member of a `T | null` union.
pub fn nullable_member(shape: &Shape) -> Option<&Shape> {
    match shape {
        Shape::Union(members) if members.len() == 2 => {
            match (&members[0], &members[1]) {
                (Shape::Leaf(LeafKind::Null), other) | (other, Shape::Leaf(LeafKind::Null)) => Some(other),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Naive singularization of English words.
pub fn singularize(word: &str) -> String {
    let w = word.to_lowercase();
    if w.ends_with("ies") {
        format!("{}y", &w[..w.len() - 3])
    } else if w.ends_with("ses") || w.ends_with("xes") || w.ends_with("zes") {
        w[..w.len() - 2].to_string()
    } else if w.ends_with("ves") {
        format!("{}f", &w[..w.len() - 3])
    } else if w.ends_with('s') && !w.ends_with("ss") {
        w[..w.len() - 1].to_string()
    } else {
        w
    }
}

/// A field identifier for a stored key: snake_case, raw syntax for
/// keywords, and a leading underscore when the key starts with a digit.
pub fn safe_field_ident(name: &str) -> proc_macro2::Ident {
    match name {
        "type" | "struct" | "enum" | "fn" | "let" | "mut" | "ref" | "mod" | "use"
        | "pub" | "impl" | "trait" | "for" | "loop" | "while" | "if" | "else" | "match"
        | "return" | "break" | "continue" | "as" | "in" | "where" | "async" | "await" | "dyn"
        | "move" | "static" | "const" | "unsafe" | "extern" | "true" | "false" | "abstract"
        | "become" | "box" | "do" | "final" | "macro" | "override" | "priv" | "typeof"
        | "unsized" | "virtual" | "yield" | "try" => format_ident!("r#{}", name),
        // These cannot be raw identifiers
        "self" | "Self" | "super" | "crate" => format_ident!("{}_", name.to_lowercase()),
        _ => {
            let snake = name.to_snake_case();
            match snake.chars().next() {
                None => format_ident!("field"),
                Some(c) if c.is_ascii_digit() => format_ident!("_{}", snake),
                Some(_) => format_ident!("{}", snake),
            }
        }
    }
}

/// A type identifier for a generated struct name.
pub fn type_ident(name: &str) -> proc_macro2::Ident {
    match name.chars().next() {
        None => format_ident!("Value"),
        Some(c) if c.is_ascii_digit() => format_ident!("T{}", name),
        Some(_) if name == "Self" => format_ident!("SelfValue"),
        Some(_) => format_ident!("{}", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("posts"), "post");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("class"), "class");
    }

    #[test]
    fn test_struct_names() {
        assert_eq!(field_struct_name(ROOT_STRUCT_NAME, "settings"), "Settings");
        assert_eq!(field_struct_name("User", "stats"), "UserStats");
        assert_eq!(field_struct_name("User", "last_login"), "UserLastLogin");
        assert_eq!(element_struct_name("Users"), "User");
        assert_eq!(element_struct_name("UserTags"), "UserTag");
        assert_eq!(partial_struct_name("User"), "UserPartial");
    }

    #[test]
    fn test_nullable_member() {
        let status = Shape::union([Shape::string(), Shape::null()]);
        assert_eq!(nullable_member(&status), Some(&Shape::string()));
        let mixed = Shape::union([Shape::string(), Shape::number()]);
        assert_eq!(nullable_member(&mixed), None);
        assert_eq!(nullable_member(&Shape::string()), None);
    }

    #[test]
    fn test_safe_field_ident() {
        assert_eq!(safe_field_ident("type").to_string(), "r#type");
        assert_eq!(safe_field_ident("self").to_string(), "self_");
        assert_eq!(safe_field_ident("displayName").to_string(), "display_name");
        assert_eq!(safe_field_ident("2fa").to_string(), "_2fa");
        assert_eq!(safe_field_ident("name").to_string(), "name");
    }

    #[test]
    fn test_type_ident() {
        assert_eq!(type_ident("User").to_string(), "User");
        assert_eq!(type_ident("2fa").to_string(), "T2fa");
    }
}

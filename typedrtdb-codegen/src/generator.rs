use proc_macro2::TokenStream;
use quote::quote;
use typedrtdb::path::path_patterns;
use typedrtdb::schema::Shape;

use crate::struct_gen;

const HEADER: &str = "// Generated by typedrtdb-codegen from the database schema. Do not edit.\n\n";

/// Generate the complete output file for a schema.
pub fn generate_all(schema: &Shape) -> TokenStream {
    let structs = struct_gen::generate_structs(schema);
    let paths = generate_paths(schema);

    quote! {
        #[allow(unused_imports)]
        use serde::{Deserialize, Serialize};

        #structs

        #paths
    }
}

/// `PATHS`: every addressable path pattern, `*` for any key, `#` for any index.
fn generate_paths(schema: &Shape) -> TokenStream {
    let patterns = path_patterns(schema);
    quote! {
        /// Every path pattern the schema accepts. `*` matches any key, `#` any list index.
        pub const PATHS: &[&str] = &[#(#patterns),*];
    }
}

/// Pretty-print generated tokens, falling back to the raw token text if
/// they do not parse as a file.
pub fn format_token_stream(tokens: &TokenStream) -> String {
    let body = match syn::parse2::<syn::File>(tokens.clone()) {
        Ok(file) => prettyplease::unparse(&file),
        Err(_) => tokens.to_string(),
    };
    format!("{HEADER}{body}")
}

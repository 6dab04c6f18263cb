//! Attribute parsing for the ManagedClass derive macro

use darling::{FromDeriveInput, FromField};
use syn::{DeriveInput, Ident, Type, Visibility};

/// Parsed #[managed(...)] attributes on the struct
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(managed), supports(struct_named))]
pub struct ManagedClassArgs {
    /// Struct identifier
    pub ident: Ident,

    /// Struct visibility, applied to the generated accessors
    pub vis: Visibility,

    /// Struct fields
    pub data: darling::ast::Data<(), ManagedFieldArgs>,

    /// Declaring assembly (e.g., "Assembly-CSharp.dll")
    #[darling(default = "default_assembly")]
    pub assembly: String,

    /// Managed class name (e.g., "PlayerController")
    #[darling(rename = "class")]
    pub class_name: String,

    /// Namespace filter; any namespace when omitted
    #[darling(default = "default_namespace")]
    pub namespace: String,
}

fn default_assembly() -> String {
    "Assembly-CSharp.dll".to_string()
}

fn default_namespace() -> String {
    "*".to_string()
}

/// Parsed #[managed(...)] attributes on a field
#[derive(Debug, FromField)]
#[darling(attributes(managed))]
pub struct ManagedFieldArgs {
    /// Field identifier
    pub ident: Option<Ident>,

    /// Field type
    pub ty: Type,

    /// Managed field name (e.g., "health")
    /// If not specified, this is not a managed field (e.g., the ptr field)
    #[darling(rename = "field")]
    pub field_name: Option<String>,

    /// Whether the field lives in static storage
    #[darling(default, rename = "static_field")]
    pub is_static: bool,

    /// Whether this field is read-only (no setter generated)
    #[darling(default)]
    pub readonly: bool,
}

impl ManagedFieldArgs {
    /// Check if this is a managed field (has field_name attribute)
    pub fn is_managed_field(&self) -> bool {
        self.field_name.is_some()
    }

    /// Check if this is the object pointer field
    pub fn is_ptr_field(&self) -> bool {
        self.ident.as_ref().map(|i| i == "ptr").unwrap_or(false)
    }
}

/// Parse a DeriveInput into ManagedClassArgs
pub fn parse_managed_class(input: &DeriveInput) -> darling::Result<ManagedClassArgs> {
    ManagedClassArgs::from_derive_input(input)
}

//! ManagedClass derive macro implementation

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, GenericArgument, Ident, PathArguments, Type, Visibility};

use crate::parse::{parse_managed_class, ManagedClassArgs, ManagedFieldArgs};

/// Extract the inner type from `PhantomData<T>` if present, otherwise return the type as-is
fn extract_inner_type(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "PhantomData" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

/// Check if a type is PhantomData
fn is_phantom_data(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "PhantomData";
        }
    }
    false
}

/// Accessor base name with any leading underscore stripped
fn clean_name(ident: &Ident) -> String {
    let name = ident.to_string();
    name.strip_prefix('_').unwrap_or(&name).to_string()
}

fn accessor_static(struct_name: &Ident, field_ident: &Ident) -> Ident {
    format_ident!(
        "__{}__{}_FIELD",
        struct_name.to_string().to_uppercase(),
        clean_name(field_ident).to_uppercase()
    )
}

/// Generate the ManagedClass implementation
pub fn derive_managed_class(input: DeriveInput) -> TokenStream {
    match parse_managed_class(&input) {
        Ok(args) => generate_impl(args),
        Err(e) => e.write_errors(),
    }
}

fn generate_impl(args: ManagedClassArgs) -> TokenStream {
    let struct_name = &args.ident;
    let vis = &args.vis;

    let fields = match &args.data {
        darling::ast::Data::Struct(fields) => &fields.fields,
        _ => {
            return syn::Error::new_spanned(
                &args.ident,
                "ManagedClass can only be derived for structs",
            )
            .to_compile_error()
        }
    };

    if !fields.iter().any(|f| f.is_ptr_field()) {
        return syn::Error::new_spanned(
            &args.ident,
            "ManagedClass requires a `ptr: *mut c_void` field",
        )
        .to_compile_error();
    }

    let managed: Vec<_> = fields
        .iter()
        .filter(|f| f.is_managed_field() && f.ident.is_some())
        .collect();

    let statics = managed.iter().map(|f| generate_static(&args, f));
    let accessors = managed.iter().map(|f| generate_accessors(struct_name, vis, f));
    let constants = generate_constants(vis, &managed);
    let object_impl = generate_object_impl(&args, fields);

    quote! {
        #(#statics)*

        impl #struct_name {
            #constants

            /// Get the raw object pointer
            #vis fn as_ptr(&self) -> *mut ::std::ffi::c_void {
                self.ptr
            }

            #(#accessors)*
        }

        #object_impl
    }
}

fn generate_static(args: &ManagedClassArgs, field: &ManagedFieldArgs) -> TokenStream {
    let Some(field_ident) = field.ident.as_ref() else {
        return quote! {};
    };
    let static_name = accessor_static(&args.ident, field_ident);
    let field_ty = extract_inner_type(&field.ty);
    let assembly = &args.assembly;
    let namespace = &args.namespace;
    let class_name = &args.class_name;
    let field_name = field.field_name.as_deref().unwrap_or_default();

    quote! {
        #[allow(non_upper_case_globals)]
        static #static_name: ::uniresolve_core::ManagedField<#field_ty> =
            ::uniresolve_core::ManagedField::new(#assembly, #namespace, #class_name, #field_name);
    }
}

fn generate_accessors(struct_name: &Ident, vis: &Visibility, field: &ManagedFieldArgs) -> TokenStream {
    let Some(field_ident) = field.ident.as_ref() else {
        return quote! {};
    };
    let field_name = field.field_name.as_deref().unwrap_or_default();
    let field_ty = extract_inner_type(&field.ty);
    let static_name = accessor_static(struct_name, field_ident);

    let name = clean_name(field_ident);
    let getter_name = format_ident!("{}", name);
    let setter_name = format_ident!("set_{}", name);
    let getter_doc = format!("Read managed field `{}`", field_name);
    let setter_doc = format!("Write managed field `{}`", field_name);

    let (getter, setter) = if field.is_static {
        (
            quote! {
                #[doc = #getter_doc]
                #[inline]
                #vis fn #getter_name() -> ::uniresolve_core::RuntimeResult<#field_ty> {
                    #static_name.get_static()
                }
            },
            quote! {
                #[doc = #setter_doc]
                #[inline]
                #vis fn #setter_name(value: #field_ty) -> ::uniresolve_core::RuntimeResult<()> {
                    #static_name.set_static(value)
                }
            },
        )
    } else {
        (
            quote! {
                #[doc = #getter_doc]
                #[inline]
                #vis fn #getter_name(&self) -> ::uniresolve_core::RuntimeResult<#field_ty> {
                    #static_name.get(self.ptr)
                }
            },
            quote! {
                #[doc = #setter_doc]
                #[inline]
                #vis fn #setter_name(&self, value: #field_ty) -> ::uniresolve_core::RuntimeResult<()> {
                    #static_name.set(self.ptr, value)
                }
            },
        )
    };

    if field.readonly {
        getter
    } else {
        quote! {
            #getter
            #setter
        }
    }
}

fn generate_constants(vis: &Visibility, fields: &[&ManagedFieldArgs]) -> TokenStream {
    let field_constants = fields.iter().filter_map(|f| {
        let field_ident = f.ident.as_ref()?;
        let field_name = f.field_name.as_ref()?;
        let const_name = format_ident!("{}_FIELD", clean_name(field_ident).to_uppercase());
        let doc = format!("Managed field name for `{}`", clean_name(field_ident));

        Some(quote! {
            #[doc = #doc]
            #vis const #const_name: &'static str = #field_name;
        })
    });

    quote! {
        #(#field_constants)*
    }
}

fn generate_object_impl(
    args: &ManagedClassArgs,
    fields: &[ManagedFieldArgs],
) -> TokenStream {
    let struct_name = &args.ident;
    let assembly = &args.assembly;
    let namespace = &args.namespace;
    let class_name = &args.class_name;

    let field_inits: Vec<_> = fields
        .iter()
        .filter(|f| !f.is_ptr_field())
        .filter_map(|f| {
            let ident = f.ident.as_ref()?;
            if is_phantom_data(&f.ty) {
                Some(quote! { #ident: ::std::marker::PhantomData })
            } else {
                Some(quote! { #ident: ::std::default::Default::default() })
            }
        })
        .collect();

    quote! {
        impl ::uniresolve_core::ManagedObject for #struct_name {
            const ASSEMBLY: &'static str = #assembly;
            const NAMESPACE: &'static str = #namespace;
            const CLASS_NAME: &'static str = #class_name;

            fn ptr(&self) -> *mut ::std::ffi::c_void {
                self.ptr
            }

            unsafe fn from_ptr(ptr: *mut ::std::ffi::c_void) -> Option<Self> {
                if ptr.is_null() {
                    None
                } else {
                    Some(Self {
                        ptr,
                        #(#field_inits),*
                    })
                }
            }
        }
    }
}

//! Metadata dump
//!
//! Three views of the discovered graph:
//!
//! - `dump.cs`: C#-like listing with field offsets and method RVAs
//! - `struct.hpp`: approximate C layouts of every class's instance fields
//! - `metadata.json`: the whole registry as JSON

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{info, instrument};

use crate::context::RuntimeContext;
use crate::managed::ValueKind;
use crate::model::{Class, Field, Registry};

/// `+0X010`, `-0X008`
fn signed_hex(value: i64, width: usize) -> String {
    let sign = if value < 0 { '-' } else { '+' };
    format!("{}0X{:0width$X}", sign, value.unsigned_abs(), width = width)
}

fn rva(native: Option<usize>, base: Option<usize>) -> i64 {
    match (native, base) {
        (Some(native), Some(base)) => (native as i128 - base as i128) as i64,
        (Some(native), None) => native as i64,
        _ => 0,
    }
}

fn write_class_header(
    w: &mut dyn Write,
    registry: &Registry,
    class: &Class,
    keyword: &str,
) -> io::Result<()> {
    let assembly = registry.assembly(class.assembly);
    writeln!(w, "\tnamespace: {}", class.namespace)?;
    writeln!(w, "\tAssembly: {}", assembly.name)?;
    writeln!(w, "\tAssemblyFile: {} ", assembly.file)?;
    match &class.parent {
        Some(parent) => write!(w, "\t{} {} : {} ", keyword, class.name, parent)?,
        None => write!(w, "\t{} {} ", keyword, class.name)?,
    }
    writeln!(w, "{{\n")
}

/// Write the `dump.cs` listing
///
/// `base` is the runtime image base; RVAs are printed relative to it.
pub fn write_class_listing(
    registry: &Registry,
    base: Option<usize>,
    w: &mut dyn Write,
) -> io::Result<()> {
    for (_, class) in registry.classes() {
        write_class_header(w, registry, class, "class")?;

        for &id in &class.fields {
            let field = registry.field(id);
            writeln!(
                w,
                "\t\t{} | {}{} {};",
                signed_hex(field.offset as i64, 3),
                if field.is_static { "static " } else { "" },
                field.ty.name,
                field.name
            )?;
        }
        writeln!(w)?;

        for &id in &class.methods {
            let method = registry.method(id);
            writeln!(
                w,
                "\t\t[Flags: {:032b}] [ParamsCount: {:04}] |RVA: {}|",
                method.flags.bits(),
                method.params.len(),
                signed_hex(rva(method.native(), base), 7)
            )?;
            let params = method
                .params
                .iter()
                .map(|p| format!("{} {}", p.ty.name, p.name))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                w,
                "\t\t{}{} {}({});\n",
                if method.is_static { "static " } else { "" },
                method.return_type.name,
                method.name,
                params
            )?;
        }
        writeln!(w, "\t}}\n")?;
    }
    writeln!(w)
}

/// C spelling and storage size of a field type, if it has a fixed layout
fn native_type(type_name: &str) -> Option<(&'static str, usize)> {
    let pointer = std::mem::size_of::<usize>();
    let kind = ValueKind::from_type_name(type_name);
    let spelled = match kind {
        ValueKind::I64 => "std::int64_t",
        ValueKind::U64 => "std::uint64_t",
        ValueKind::I32 => "int",
        ValueKind::U32 => "std::uint32_t",
        ValueKind::Bool => "bool",
        ValueKind::F32 => "float",
        ValueKind::F64 => "double",
        ValueKind::String => "UnityType::String*",
        ValueKind::Vector2 => "UnityType::Vector2",
        ValueKind::Vector3 => "UnityType::Vector3",
        ValueKind::Vector4 => "UnityType::Vector4",
        ValueKind::Quaternion => "UnityType::Quaternion",
        ValueKind::Color => "UnityType::Color",
        ValueKind::Rect => "UnityType::Rect",
        ValueKind::Matrix4x4 => "UnityType::Matrix4x4",
        _ => {
            return match type_name {
                "UnityEngine.GameObject" => Some(("UnityType::GameObject*", pointer)),
                "UnityEngine.Transform" => Some(("UnityType::Transform*", pointer)),
                "UnityEngine.Component" => Some(("UnityType::Component*", pointer)),
                "UnityEngine.Animator" => Some(("UnityType::Animator*", pointer)),
                "UnityEngine.Rigidbody" => Some(("UnityType::Rigidbody*", pointer)),
                "UnityEngine.Physics" => Some(("UnityType::Physics*", pointer)),
                _ => None,
            }
        }
    };
    Some((spelled, kind.size()?))
}

fn c_identifier(name: &str) -> String {
    name.replace(['<', '>'], "_")
}

fn write_layout(w: &mut dyn Write, field: &Field, next: Option<&Field>) -> io::Result<()> {
    let name = c_identifier(&field.name);
    let Some(next) = next else {
        return writeln!(w, "\t\tchar {}[0x{:06X}];", name, 4);
    };
    let gap = (next.offset as i64 - field.offset as i64).max(0);

    match native_type(&field.ty.name) {
        Some((spelled, size)) => {
            writeln!(w, "\t\t{} {};", spelled, name)?;
            if gap > size as i64 {
                writeln!(w, "\t\tchar {}_[0x{:06X}];", name, gap - size as i64)?;
            }
            Ok(())
        }
        None => writeln!(w, "\t\tchar {}[0x{:06X}];", name, gap),
    }
}

/// Write the `struct.hpp` layouts
///
/// Only instance fields are laid out. Each field is followed by explicit
/// padding up to the next instance field; the last one is given four bytes.
pub fn write_struct_layouts(registry: &Registry, w: &mut dyn Write) -> io::Result<()> {
    for (_, class) in registry.classes() {
        write_class_header(w, registry, class, "struct")?;

        let fields: Vec<&Field> = class
            .fields
            .iter()
            .map(|&id| registry.field(id))
            .filter(|f| !f.is_static)
            .collect();
        for (i, field) in fields.iter().enumerate() {
            write_layout(w, field, fields.get(i + 1).copied())?;
        }

        writeln!(w)?;
        writeln!(w, "\t}};\n")?;
    }
    writeln!(w)
}

#[derive(Serialize)]
struct ParamSnapshot<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    ty: &'a str,
}

#[derive(Serialize)]
struct FieldSnapshot<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    ty: &'a str,
    size: Option<i32>,
    offset: i32,
    is_static: bool,
}

#[derive(Serialize)]
struct MethodSnapshot<'a> {
    name: &'a str,
    return_type: &'a str,
    params: Vec<ParamSnapshot<'a>>,
    flags: u32,
    is_static: bool,
    is_virtual: bool,
    native: Option<usize>,
}

#[derive(Serialize)]
struct ClassSnapshot<'a> {
    name: &'a str,
    namespace: &'a str,
    parent: Option<&'a str>,
    fields: Vec<FieldSnapshot<'a>>,
    methods: Vec<MethodSnapshot<'a>>,
}

#[derive(Serialize)]
struct AssemblySnapshot<'a> {
    name: &'a str,
    file: &'a str,
    classes: Vec<ClassSnapshot<'a>>,
}

fn snapshot(registry: &Registry) -> Vec<AssemblySnapshot<'_>> {
    registry
        .assemblies()
        .map(|(_, assembly)| AssemblySnapshot {
            name: &assembly.name,
            file: &assembly.file,
            classes: assembly
                .classes
                .iter()
                .map(|&id| {
                    let class = registry.class(id);
                    ClassSnapshot {
                        name: &class.name,
                        namespace: &class.namespace,
                        parent: class.parent.as_deref(),
                        fields: class
                            .fields
                            .iter()
                            .map(|&id| {
                                let f = registry.field(id);
                                FieldSnapshot {
                                    name: &f.name,
                                    ty: &f.ty.name,
                                    size: f.ty.size,
                                    offset: f.offset,
                                    is_static: f.is_static,
                                }
                            })
                            .collect(),
                        methods: class
                            .methods
                            .iter()
                            .map(|&id| {
                                let m = registry.method(id);
                                MethodSnapshot {
                                    name: &m.name,
                                    return_type: &m.return_type.name,
                                    params: m
                                        .params
                                        .iter()
                                        .map(|p| ParamSnapshot {
                                            name: &p.name,
                                            ty: &p.ty.name,
                                        })
                                        .collect(),
                                    flags: m.flags.bits(),
                                    is_static: m.is_static,
                                    is_virtual: m.is_virtual(),
                                    native: m.native(),
                                }
                            })
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect()
}

/// Write the registry as pretty-printed JSON
pub fn write_json(registry: &Registry, w: &mut dyn Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, &snapshot(registry))?;
    writeln!(w)
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write(&mut w)?;
    w.flush()
}

/// Write `dump.cs`, `struct.hpp` and `metadata.json` into `dir`
#[instrument(skip(ctx), fields(dir = %dir.display()))]
pub fn dump_to_dir(ctx: &RuntimeContext, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let registry = ctx.registry();
    let base = ctx.ops().module_base();

    write_file(&dir.join("dump.cs"), |w| {
        write_class_listing(registry, base, w)
    })?;
    write_file(&dir.join("struct.hpp"), |w| write_struct_layouts(registry, w))?;
    write_file(&dir.join("metadata.json"), |w| write_json(registry, w))?;

    info!(
        "Dumped {} classes to {}",
        registry.class_count(),
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureMethod, FixtureOps};
    use uniresolve_sdk::RuntimeKind;

    extern "C" fn noop() {}

    fn fixture() -> FixtureOps {
        FixtureOps::new(RuntimeKind::Il2Cpp)
            .module_base(0x1000)
            .assembly("Game")
            .class("Game", "Actor", Some("MonoBehaviour"))
            .field("<Id>k__BackingField", "System.Int32", 0x10)
            .field("speed", "System.Single", 0x18)
            .static_field("count", "System.Int32", &0i32.to_ne_bytes())
            .field("target", "Game.Target", 0x20)
            .field("pos", "UnityEngine.Vector3", 0x28)
            .method(
                FixtureMethod::new("Move", "System.Void")
                    .param("delta", "UnityEngine.Vector3")
                    .param("fast", "System.Boolean")
                    .flags(0x0086)
                    .native(0x1234),
            )
            .method(FixtureMethod::new("Create", "Game.Actor").static_().native(noop as usize))
    }

    fn render(f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_class_listing_format() {
        let ctx = testing::context(fixture());
        let text = render(|w| write_class_listing(ctx.registry(), Some(0x1000), w));

        assert!(text.starts_with(
            "\tnamespace: Game\n\tAssembly: Game.dll\n\tAssemblyFile: Game.dll \n\tclass Actor : MonoBehaviour {\n\n"
        ));
        assert!(text.contains("\t\t+0X010 | System.Int32 <Id>k__BackingField;\n"));
        assert!(text.contains("\t\t+0X000 | static System.Int32 count;\n"));
        assert!(text.contains(
            "\t\t[Flags: 00000000000000000000000010000110] [ParamsCount: 0002] |RVA: +0X0000234|\n"
        ));
        assert!(text.contains("\t\tSystem.Void Move(UnityEngine.Vector3 delta, System.Boolean fast);\n\n"));
        assert!(text.contains("\t\tstatic Game.Actor Create();\n\n\t}\n\n"));
    }

    #[test]
    fn test_struct_layout_padding() {
        let ctx = testing::context(fixture());
        let text = render(|w| write_struct_layouts(ctx.registry(), w));

        let body: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("\tstruct Actor"))
            .skip(2)
            .take_while(|l| !l.is_empty())
            .collect();
        assert_eq!(
            body,
            [
                "\t\tint _Id_k__BackingField;",
                "\t\tchar _Id_k__BackingField_[0x000004];",
                "\t\tfloat speed;",
                "\t\tchar speed_[0x000004];",
                "\t\tchar target[0x000008];",
                "\t\tchar pos[0x000004];",
            ]
        );
        assert!(text.contains("\t};\n"));
    }

    #[test]
    fn test_json_snapshot() {
        let ctx = testing::context(fixture());
        let text = render(|w| write_json(ctx.registry(), w));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        let actor = &value[0]["classes"][0];
        assert_eq!(actor["name"], "Actor");
        assert_eq!(actor["fields"][2]["is_static"], true);
        assert_eq!(actor["methods"][0]["params"][1]["type"], "System.Boolean");
        assert_eq!(actor["methods"][0]["native"], 0x1234);
    }

    #[test]
    fn test_dump_to_dir() {
        let ctx = testing::context(fixture());
        let dir = std::env::temp_dir().join(format!("uniresolve-dump-{}", std::process::id()));
        dump_to_dir(&ctx, &dir).unwrap();
        for file in ["dump.cs", "struct.hpp", "metadata.json"] {
            assert!(fs::metadata(dir.join(file)).unwrap().len() > 0, "{file}");
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_signed_hex() {
        assert_eq!(signed_hex(0x10, 3), "+0X010");
        assert_eq!(signed_hex(-8, 3), "-0X008");
        assert_eq!(signed_hex(0x1234, 3), "+0X1234");
        assert_eq!(rva(Some(0x800), Some(0x1000)), -0x800);
        assert_eq!(rva(None, Some(0x1000)), 0);
    }
}

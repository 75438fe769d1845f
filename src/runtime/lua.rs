//! Lua 5.4 implementation of `ScriptRuntime`.
//!
//! Each `LuaRuntime` owns one `mlua::Lua` state. On open it evaluates the
//! prelude (class system, symbols, `Time`), registers the builtin wrappers under
//! `Builtin`, and runs any preload files. Objects the scan keeps across calls
//! (the wrapper class, the constructed iterator) live in `pinned`; objects that
//! appear inside a returned row live in `transient` until `reclaim`.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use mlua::{Function, Lua, MultiValue, RegistryKey, Table, Value as LVal};
use tracing::debug;

use crate::runtime::{RuntimeException, ScriptRuntime};
use crate::settings::Settings;
use crate::value::{ObjectRef, OpaqueHandle, OpaqueValue, TaggedValue};

const PRELUDE: &str = include_str!("../../scripts/prelude.lua");

/// Wrapper classes compiled into every runtime, resolvable by `wrapper_class`.
pub const BUILTIN_WRAPPERS: &[(&str, &str)] = &[
    ("Builtin.Series", include_str!("../../scripts/wrappers/series.lua")),
    ("Builtin.Lines", include_str!("../../scripts/wrappers/lines.lua")),
];

const MAX_DEPTH: usize = 64;
/// Widest table `row(...)` may declare.
pub const MAX_ROW_WIDTH: i64 = 4096;

pub struct LuaRuntime {
    lua: Lua,
    internal: RegistryKey,
    version: String,
    pinned: Vec<RegistryKey>,
    transient: Vec<RegistryKey>,
}

impl std::fmt::Debug for LuaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaRuntime")
            .field("version", &self.version)
            .field("pinned", &self.pinned.len())
            .field("transient", &self.transient.len())
            .finish_non_exhaustive()
    }
}

// Lua errors raised through pcall carry a traceback; keep only the message line(s).
fn strip_traceback(msg: &str) -> &str {
    msg.split("\nstack traceback:").next().unwrap_or(msg)
}

fn lua_err(e: mlua::Error) -> RuntimeException {
    match e {
        mlua::Error::RuntimeError(msg) => RuntimeException::new(strip_traceback(&msg)),
        mlua::Error::CallbackError { cause, .. } => RuntimeException::new(strip_traceback(&cause.to_string())),
        other => RuntimeException::new(strip_traceback(&other.to_string())),
    }
}

fn internal_fn<'lua>(lua: &'lua Lua, internal: &RegistryKey, name: &str) -> Result<Function<'lua>, RuntimeException> {
    let t: Table = lua.registry_value(internal).map_err(lua_err)?;
    t.get(name).map_err(lua_err)
}

fn kind_of<'lua>(kind: &Function<'lua>, v: &LVal<'lua>) -> Result<(String, Option<String>), RuntimeException> {
    kind.call::<_, (String, Option<String>)>(v.clone()).map_err(lua_err)
}

fn stash<'lua>(lua: &'lua Lua, transient: &mut Vec<RegistryKey>, type_name: String, v: LVal<'lua>) -> Result<TaggedValue, RuntimeException> {
    let key = lua.create_registry_value(v).map_err(lua_err)?;
    transient.push(key);
    Ok(TaggedValue::Opaque(OpaqueValue { type_name, handle: OpaqueHandle(transient.len() - 1) }))
}

fn key_order(a: &TaggedValue, b: &TaggedValue) -> Ordering {
    fn rank(v: &TaggedValue) -> u8 {
        match v {
            TaggedValue::Integer(_) | TaggedValue::Float(_) => 0,
            TaggedValue::Text(_) => 1,
            TaggedValue::Bool(_) => 2,
            _ => 3,
        }
    }
    fn number(v: &TaggedValue) -> f64 {
        match v { TaggedValue::Integer(i) => *i as f64, TaggedValue::Float(f) => *f, _ => 0.0 }
    }
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (TaggedValue::Integer(x), TaggedValue::Integer(y)) => x.cmp(y),
        (TaggedValue::Text(x), TaggedValue::Text(y)) => x.cmp(y),
        (x, y) if rank(x) == 0 => number(x).partial_cmp(&number(y)).unwrap_or(Ordering::Equal),
        (x, y) => x.to_string().cmp(&y.to_string()),
    })
}

fn lower_table<'lua>(
    lua: &'lua Lua,
    kind: &Function<'lua>,
    transient: &mut Vec<RegistryKey>,
    t: &Table<'lua>,
    packed: bool,
    depth: usize,
) -> Result<TaggedValue, RuntimeException> {
    if depth >= MAX_DEPTH {
        return Ok(TaggedValue::Error(format!("table nesting exceeds {} levels", MAX_DEPTH)));
    }
    let mut pairs: Vec<(LVal, LVal)> = Vec::new();
    for pair in t.clone().pairs::<LVal, LVal>() {
        pairs.push(pair.map_err(lua_err)?);
    }

    if packed {
        return lower_packed_row(lua, kind, transient, pairs, depth);
    }

    // Sequence when the keys are exactly 1..n.
    let mut max_index = 0i64;
    let mut int_keys = 0i64;
    let mut other_keys = false;
    for (k, _) in &pairs {
        match k {
            LVal::Integer(i) if *i >= 1 => { int_keys += 1; max_index = max_index.max(*i); }
            _ => other_keys = true,
        }
    }
    if !other_keys && int_keys == max_index {
        let mut items = vec![TaggedValue::Null; max_index as usize];
        for (k, v) in pairs {
            if let LVal::Integer(i) = k {
                items[(i - 1) as usize] = lower(lua, kind, transient, v, depth + 1)?;
            }
        }
        return Ok(TaggedValue::Sequence(items));
    }

    let mut entries = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let key = lower(lua, kind, transient, k, depth + 1)?;
        let val = lower(lua, kind, transient, v, depth + 1)?;
        entries.push((key, val));
    }
    entries.sort_by(|a, b| key_order(&a.0, &b.0));
    Ok(TaggedValue::Mapping(entries))
}

/// A `row(...)` table: elements live at 1..=n, where `n` counts trailing nils.
fn lower_packed_row<'lua>(
    lua: &'lua Lua,
    kind: &Function<'lua>,
    transient: &mut Vec<RegistryKey>,
    pairs: Vec<(LVal<'lua>, LVal<'lua>)>,
    depth: usize,
) -> Result<TaggedValue, RuntimeException> {
    let width = pairs.iter().find_map(|(k, v)| match (k, v) {
        (LVal::String(s), LVal::Integer(n)) if s.as_bytes() == b"n" => Some(*n),
        _ => None,
    });
    let width = match width {
        Some(n) if (0..=MAX_ROW_WIDTH).contains(&n) => n,
        Some(n) => return Ok(TaggedValue::Error(format!("row width {} exceeds {} columns", n, MAX_ROW_WIDTH))),
        None => return Ok(TaggedValue::Error("row table has no integer n field".to_string())),
    };
    let mut items = vec![TaggedValue::Null; width as usize];
    for (k, v) in pairs {
        match k {
            LVal::Integer(i) if (1..=width).contains(&i) => items[(i - 1) as usize] = lower(lua, kind, transient, v, depth + 1)?,
            LVal::String(ref s) if s.as_bytes() == b"n" => {}
            other => {
                let key = lower(lua, kind, transient, other, depth + 1)?;
                return Ok(TaggedValue::Error(format!("row table has key {} outside 1..{}", key, width)));
            }
        }
    }
    Ok(TaggedValue::Sequence(items))
}

fn lower<'lua>(
    lua: &'lua Lua,
    kind: &Function<'lua>,
    transient: &mut Vec<RegistryKey>,
    v: LVal<'lua>,
    depth: usize,
) -> Result<TaggedValue, RuntimeException> {
    let out = match v {
        LVal::Nil => TaggedValue::Null,
        LVal::Boolean(b) => TaggedValue::Bool(b),
        LVal::Integer(i) => TaggedValue::Integer(i),
        LVal::Number(n) => TaggedValue::Float(n),
        LVal::String(s) => TaggedValue::Text(s.as_bytes().to_vec()),
        LVal::Function(_) => TaggedValue::Callable,
        LVal::Error(e) => TaggedValue::Error(lua_err(e).message),
        v @ LVal::Thread(_) => stash(lua, transient, "thread".to_string(), v)?,
        v @ LVal::LightUserData(_) => stash(lua, transient, "lightuserdata".to_string(), v)?,
        v @ (LVal::Table(_) | LVal::UserData(_)) => {
            let (k, detail) = kind_of(kind, &v)?;
            match k.as_str() {
                "class" => TaggedValue::TypeRef(detail.unwrap_or_default()),
                "symbol" => TaggedValue::Symbol(detail.unwrap_or_default().into_bytes()),
                "object" => stash(lua, transient, detail.unwrap_or_default(), v)?,
                "table" | "row" => match &v {
                    LVal::Table(t) => lower_table(lua, kind, transient, t, k == "row", depth)?,
                    _ => TaggedValue::Unknown("userdata".to_string()),
                },
                other => TaggedValue::Unknown(other.to_string()),
            }
        }
        #[allow(unreachable_patterns)]
        other => TaggedValue::Unknown(other.type_name().to_string()),
    };
    Ok(out)
}

fn lift<'lua>(lua: &'lua Lua, transient: &[RegistryKey], v: &TaggedValue) -> Result<LVal<'lua>, RuntimeException> {
    let out = match v {
        TaggedValue::Null | TaggedValue::Undefined => LVal::Nil,
        TaggedValue::Bool(b) => LVal::Boolean(*b),
        TaggedValue::Integer(i) => LVal::Integer(*i),
        TaggedValue::Float(f) => LVal::Number(*f),
        TaggedValue::Text(b) => LVal::String(lua.create_string(b).map_err(lua_err)?),
        TaggedValue::Symbol(name) => {
            let sym: Function = lua.globals().get("sym").map_err(lua_err)?;
            sym.call::<_, LVal>(lua.create_string(name).map_err(lua_err)?).map_err(lua_err)?
        }
        TaggedValue::Sequence(items) => {
            let tbl = lua.create_table().map_err(lua_err)?;
            for (i, item) in items.iter().enumerate() {
                tbl.set(i as i64 + 1, lift(lua, transient, item)?).map_err(lua_err)?;
            }
            LVal::Table(tbl)
        }
        TaggedValue::Mapping(entries) => {
            let tbl = lua.create_table().map_err(lua_err)?;
            for (k, val) in entries {
                tbl.set(lift(lua, transient, k)?, lift(lua, transient, val)?).map_err(lua_err)?;
            }
            LVal::Table(tbl)
        }
        TaggedValue::Opaque(o) => {
            let key = transient
                .get(o.handle.0)
                .ok_or_else(|| RuntimeException::new(format!("stale handle for {} object", o.type_name)))?;
            lua.registry_value(key).map_err(lua_err)?
        }
        other => return Err(RuntimeException::new(format!("cannot pass {} values into Lua", other.kind_name()))),
    };
    Ok(out)
}

impl LuaRuntime {
    /// Open a runtime using the process-wide preload list.
    pub fn open() -> Result<Self, RuntimeException> { Self::open_with(&Settings::global().preload) }

    pub fn open_with(preload: &[PathBuf]) -> Result<Self, RuntimeException> {
        let lua = Lua::new();
        let internal: Table = lua.load(PRELUDE).set_name("=prelude").eval().map_err(lua_err)?;
        let internal = lua.create_registry_value(internal).map_err(lua_err)?;
        for (name, code) in BUILTIN_WRAPPERS {
            lua.load(*code).set_name(*name).exec()
                .map_err(|e| RuntimeException::new(format!("builtin wrapper {}: {}", name, lua_err(e))))?;
        }
        for path in preload {
            let code = std::fs::read_to_string(path)
                .map_err(|e| RuntimeException::new(format!("cannot read preload {}: {}", path.display(), e)))?;
            let label = format!("@{}", path.display());
            lua.load(code.as_str()).set_name(label.as_str()).exec().map_err(lua_err)?;
            debug!(target: "scriptscan::lua", "preloaded {}", path.display());
        }
        let version: String = lua.globals().get("_VERSION").map_err(lua_err)?;
        debug!(target: "scriptscan::lua", "opened {} runtime ({} builtin wrappers)", version, BUILTIN_WRAPPERS.len());
        Ok(Self { lua, internal, version, pinned: Vec::new(), transient: Vec::new() })
    }

    fn pin_class(&mut self, v: LValOwned, what: &str) -> Result<ObjectRef, RuntimeException> {
        let Self { lua, internal, pinned, .. } = self;
        let lua: &Lua = lua;
        let value: LVal = lua.registry_value(&v.0).map_err(lua_err)?;
        let kind = internal_fn(lua, internal, "kind")?;
        let (k, _) = kind_of(&kind, &value)?;
        if k != "class" {
            let _ = lua.remove_registry_value(v.0);
            return Err(RuntimeException::new(format!("{} is not a class (got {})", what, k)));
        }
        pinned.push(v.0);
        Ok(ObjectRef(pinned.len() - 1))
    }
}

/// A value parked in the registry so it can cross a `&mut self` boundary.
struct LValOwned(RegistryKey);

impl ScriptRuntime for LuaRuntime {
    fn interpreter_version(&self) -> String { self.version.clone() }

    fn load_script(&mut self, path: &Path) -> Result<ObjectRef, RuntimeException> {
        let code = std::fs::read_to_string(path)
            .map_err(|e| RuntimeException::new(format!("cannot read {}: {}", path.display(), e)))?;
        let label = format!("@{}", path.display());
        let parked = {
            let value: LVal = self.lua.load(code.as_str()).set_name(label.as_str()).eval().map_err(lua_err)?;
            LValOwned(self.lua.create_registry_value(value).map_err(lua_err)?)
        };
        debug!(target: "scriptscan::lua", "loaded wrapper script {}", path.display());
        self.pin_class(parked, &format!("value returned by {}", path.display()))
    }

    fn resolve_type(&mut self, qualified_name: &str) -> Result<ObjectRef, RuntimeException> {
        let parked = {
            let mut cur = LVal::Table(self.lua.globals());
            for seg in qualified_name.split('.') {
                cur = match cur {
                    LVal::Table(t) => t.get(seg).map_err(lua_err)?,
                    _ => LVal::Nil,
                };
                if cur.is_nil() {
                    return Err(RuntimeException::new(format!("uninitialized constant {}", qualified_name)));
                }
            }
            LValOwned(self.lua.create_registry_value(cur).map_err(lua_err)?)
        };
        self.pin_class(parked, qualified_name)
    }

    fn call(&mut self, receiver: ObjectRef, method: &str, args: &[TaggedValue]) -> Result<TaggedValue, RuntimeException> {
        let Self { lua, internal, pinned, transient, .. } = self;
        let lua: &Lua = lua;
        let recv_key = pinned
            .get(receiver.0)
            .ok_or_else(|| RuntimeException::new(format!("no pinned object #{}", receiver.0)))?;
        let recv: LVal = lua.registry_value(recv_key).map_err(lua_err)?;
        let send = internal_fn(lua, internal, "send")?;
        let kind = internal_fn(lua, internal, "kind")?;

        let mut mv = MultiValue::new();
        for a in args.iter().rev() {
            mv.push_front(lift(lua, transient, a)?);
        }
        mv.push_front(LVal::String(lua.create_string(method).map_err(lua_err)?));
        mv.push_front(recv);

        let out: LVal = send.call(mv).map_err(lua_err)?;
        lower(lua, &kind, transient, out, 0)
    }

    fn invoke(&mut self, value: &TaggedValue, method: &str) -> Result<TaggedValue, RuntimeException> {
        let Self { lua, internal, transient, .. } = self;
        let lua: &Lua = lua;
        let recv = lift(lua, transient, value)?;
        let send = internal_fn(lua, internal, "send")?;
        let kind = internal_fn(lua, internal, "kind")?;
        let out: LVal = send.call((recv, method)).map_err(lua_err)?;
        lower(lua, &kind, transient, out, 0)
    }

    fn retain(&mut self, value: &TaggedValue) -> Result<ObjectRef, RuntimeException> {
        let Self { lua, pinned, transient, .. } = self;
        let lua: &Lua = lua;
        let v = lift(lua, transient, value)?;
        let key = lua.create_registry_value(v).map_err(lua_err)?;
        pinned.push(key);
        Ok(ObjectRef(pinned.len() - 1))
    }

    fn inspect(&mut self, value: &TaggedValue) -> Result<String, RuntimeException> {
        match value {
            TaggedValue::Opaque(_) => {
                let Self { lua, internal, transient, .. } = self;
                let lua: &Lua = lua;
                let v = lift(lua, transient, value)?;
                let tostring = internal_fn(lua, internal, "tostring")?;
                tostring.call::<_, String>(v).map_err(lua_err)
            }
            other => Ok(other.to_string()),
        }
    }

    fn class_name(&mut self, value: &TaggedValue) -> Result<String, RuntimeException> {
        let name = match value {
            TaggedValue::Opaque(_) => {
                let Self { lua, internal, transient, .. } = self;
                let lua: &Lua = lua;
                let v = lift(lua, transient, value)?;
                let class_name = internal_fn(lua, internal, "class_name")?;
                return class_name.call::<_, String>(v).map_err(lua_err);
            }
            TaggedValue::TypeRef(_) => "Class",
            TaggedValue::Symbol(_) => "Symbol",
            TaggedValue::Null | TaggedValue::Undefined => "Nil",
            TaggedValue::Bool(_) => "Boolean",
            TaggedValue::Integer(_) | TaggedValue::Float(_) => "Number",
            TaggedValue::Text(_) => "String",
            TaggedValue::Sequence(_) | TaggedValue::Mapping(_) => "Table",
            TaggedValue::Callable => "Function",
            TaggedValue::Error(_) => "Error",
            TaggedValue::Unknown(tag) => return Ok(tag.clone()),
        };
        Ok(name.to_string())
    }

    fn reclaim(&mut self) {
        for key in self.transient.drain(..) {
            let _ = self.lua.remove_registry_value(key);
        }
    }
}

impl Drop for LuaRuntime {
    fn drop(&mut self) {
        debug!(target: "scriptscan::lua", "closing {} runtime ({} pinned objects)", self.version, self.pinned.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(rt: &mut LuaRuntime, src: &str) -> TaggedValue {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("each_case.lua");
        std::fs::write(&p, format!(
            "local Case = class('Case')\nfunction Case:each() {} end\nreturn Case", src
        )).unwrap();
        let class = rt.load_script(&p).unwrap();
        let obj = rt.call(class, "new", &[TaggedValue::Mapping(vec![])]).unwrap();
        let obj = rt.retain(&obj).unwrap();
        rt.call(obj, "each", &[]).unwrap()
    }

    #[test]
    fn lowers_primitive_kinds() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "return { true, false, 7, 1.5, 'hi' }");
        assert_eq!(v, TaggedValue::Sequence(vec![
            TaggedValue::Bool(true), TaggedValue::Bool(false), TaggedValue::Integer(7),
            TaggedValue::Float(1.5), TaggedValue::text("hi"),
        ]));
    }

    #[test]
    fn packed_rows_keep_nils() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "return row(1, nil, 3, nil)");
        assert_eq!(v, TaggedValue::Sequence(vec![
            TaggedValue::Integer(1), TaggedValue::Null, TaggedValue::Integer(3), TaggedValue::Null,
        ]));
    }

    #[test]
    fn n_field_on_plain_tables_is_data() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "return { n = 3 }");
        assert_eq!(v, TaggedValue::Mapping(vec![(TaggedValue::text("n"), TaggedValue::Integer(3))]));

        let v = eval(&mut rt, "return { { n = 2 } }");
        assert_eq!(v, TaggedValue::Sequence(vec![
            TaggedValue::Mapping(vec![(TaggedValue::text("n"), TaggedValue::Integer(2))]),
        ]));
    }

    #[test]
    fn huge_sparse_indexes_do_not_allocate_width() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "return { [1 << 40] = 1, n = 1 << 40 }");
        match v {
            TaggedValue::Mapping(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected mapping, got {:?}", other),
        }

        let v = eval(&mut rt, "local r = row(1); r.n = 1 << 40; r[1 << 40] = 2; return r");
        match v {
            TaggedValue::Error(msg) => assert!(msg.contains("exceeds"), "{}", msg),
            other => panic!("expected error, got {:?}", other),
        }

        let v = eval(&mut rt, "local r = row(1, 2); r.extra = true; return r");
        assert!(matches!(v, TaggedValue::Error(ref msg) if msg.contains("outside")));
    }

    #[test]
    fn lowers_object_model_kinds() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "return { sym('ok'), print, Time, Time.at(5), { b = 2, a = 1 } }");
        let items = v.as_sequence().unwrap().to_vec();
        assert_eq!(items[0], TaggedValue::Symbol(b"ok".to_vec()));
        assert_eq!(items[1], TaggedValue::Callable);
        assert_eq!(items[2], TaggedValue::TypeRef("Time".into()));
        match &items[3] {
            TaggedValue::Opaque(o) => assert_eq!(o.type_name, "Time"),
            other => panic!("expected opaque, got {:?}", other),
        }
        assert_eq!(items[4], TaggedValue::Mapping(vec![
            (TaggedValue::text("a"), TaggedValue::Integer(1)),
            (TaggedValue::text("b"), TaggedValue::Integer(2)),
        ]));
        assert_eq!(rt.invoke(&items[3], "to_i").unwrap(), TaggedValue::Integer(5));
        assert_eq!(rt.class_name(&items[3]).unwrap(), "Time");
        assert_eq!(rt.class_name(&items[2]).unwrap(), "Class");
        assert_eq!(rt.inspect(&items[3]).unwrap(), "1970-01-01 00:00:05 UTC");
    }

    #[test]
    fn cyclic_tables_lower_to_error() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "local t = {}; t[1] = t; return { t }");
        let mut cur = &v;
        loop {
            match cur {
                TaggedValue::Sequence(items) => cur = &items[0],
                TaggedValue::Error(msg) => { assert!(msg.contains("nesting")); break; }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn open_uses_process_settings() {
        let mut rt = LuaRuntime::open().unwrap();
        assert!(rt.interpreter_version().starts_with("Lua 5.4"));
        assert!(rt.resolve_type("Builtin.Lines").is_ok());
    }

    #[test]
    fn resolves_builtin_wrappers() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        assert!(rt.resolve_type("Builtin.Series").is_ok());
        let err = rt.resolve_type("Builtin.Nope").unwrap_err();
        assert!(err.message.contains("uninitialized constant"));
        let err = rt.resolve_type("string").unwrap_err();
        assert!(err.message.contains("not a class"));
    }

    #[test]
    fn reclaim_invalidates_transient_handles() {
        let mut rt = LuaRuntime::open_with(&[]).unwrap();
        let v = eval(&mut rt, "return { Time.at(1) }");
        let t = v.as_sequence().unwrap()[0].clone();
        rt.reclaim();
        assert!(rt.invoke(&t, "to_i").unwrap_err().message.contains("stale handle"));
    }
}

use quarry_core::{Diagnostic, Range};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Universal symbol reference: a string key stable across translation units
/// for one semantic entity.
pub type Usr = String;

macro_rules! local_id {
    ($name:ident) => {
        /// Dense, zero-based id local to one [`IndexFile`].
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

local_id!(IndexTypeId);
local_id!(IndexFuncId);
local_id!(IndexVarId);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageId {
    #[default]
    Unknown,
    C,
    Cpp,
    ObjC,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    #[default]
    Unknown,
    Class,
    Struct,
    Enum,
    Union,
    TypeAlias,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncKind {
    #[default]
    Unknown,
    Free,
    Method,
    Constructor,
    Destructor,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    #[default]
    Unknown,
    Global,
    Local,
    Field,
    Parameter,
}

/// One resolved `#include` directive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInclude {
    pub line: u32,
    pub resolved_path: String,
}

/// A call edge: the callee/caller function plus the call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncRef {
    pub id: IndexFuncId,
    pub loc: Range,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub short_name: String,
    pub detailed_name: String,
    pub kind: TypeKind,
    pub hover: String,
    pub definition_spelling: Option<Range>,
    pub definition_extent: Option<Range>,
    pub alias_of: Option<IndexTypeId>,
    pub parents: Vec<IndexTypeId>,
    pub types: Vec<IndexTypeId>,
    pub funcs: Vec<IndexFuncId>,
    pub vars: Vec<IndexVarId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexType {
    pub id: IndexTypeId,
    pub usr: Usr,
    pub def: TypeDef,
    pub derived: Vec<IndexTypeId>,
    pub instances: Vec<IndexVarId>,
    pub uses: Vec<Range>,
}

impl IndexType {
    pub fn new(id: IndexTypeId, usr: Usr) -> Self {
        Self {
            id,
            usr,
            def: TypeDef::default(),
            derived: Vec::new(),
            instances: Vec::new(),
            uses: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDef {
    pub short_name: String,
    pub detailed_name: String,
    pub kind: FuncKind,
    pub hover: String,
    pub definition_spelling: Option<Range>,
    pub definition_extent: Option<Range>,
    pub declaring_type: Option<IndexTypeId>,
    pub base: Option<IndexFuncId>,
    pub callees: Vec<FuncRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFunc {
    pub id: IndexFuncId,
    pub usr: Usr,
    pub def: FuncDef,
    pub declarations: Vec<Range>,
    pub derived: Vec<IndexFuncId>,
    pub callers: Vec<FuncRef>,
}

impl IndexFunc {
    pub fn new(id: IndexFuncId, usr: Usr) -> Self {
        Self {
            id,
            usr,
            def: FuncDef::default(),
            declarations: Vec::new(),
            derived: Vec::new(),
            callers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDef {
    pub short_name: String,
    pub detailed_name: String,
    pub kind: VarKind,
    pub hover: String,
    pub declaration: Option<Range>,
    pub definition_spelling: Option<Range>,
    pub definition_extent: Option<Range>,
    pub variable_type: Option<IndexTypeId>,
    pub declaring_type: Option<IndexTypeId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexVar {
    pub id: IndexVarId,
    pub usr: Usr,
    pub def: VarDef,
    pub uses: Vec<Range>,
}

impl IndexVar {
    pub fn new(id: IndexVarId, usr: Usr) -> Self {
        Self {
            id,
            usr,
            def: VarDef::default(),
            uses: Vec::new(),
        }
    }
}

/// Bidirectional USR ↔ local-id maps for one file.
///
/// Not serialized; rebuilt from the symbol tables after a load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdCache {
    pub primary_file: String,
    pub usr_to_type_id: HashMap<Usr, IndexTypeId>,
    pub usr_to_func_id: HashMap<Usr, IndexFuncId>,
    pub usr_to_var_id: HashMap<Usr, IndexVarId>,
    pub type_id_to_usr: HashMap<IndexTypeId, Usr>,
    pub func_id_to_usr: HashMap<IndexFuncId, Usr>,
    pub var_id_to_usr: HashMap<IndexVarId, Usr>,
}

/// The serialized semantic index of one translation unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    /// Format number stamped at serialize time; a mismatch on load rejects
    /// the payload.
    pub version: i32,
    pub path: String,
    /// The primary translation unit that imports this file. Equal to `path`
    /// for top-level sources.
    pub import_file: String,
    pub args: Vec<String>,
    pub language: LanguageId,
    /// Source mtime at index time, whole seconds since the Unix epoch.
    pub last_modification_time: i64,
    pub includes: Vec<IndexInclude>,
    /// Resolved paths this translation unit textually reads.
    pub dependencies: Vec<String>,
    /// Preprocessor-inactive regions, published to clients as dimmed lines.
    pub skipped_by_preprocessor: Vec<Range>,
    pub types: Vec<IndexType>,
    pub funcs: Vec<IndexFunc>,
    pub vars: Vec<IndexVar>,

    #[serde(skip)]
    pub id_cache: IdCache,
    /// Source snapshot captured at index time; persisted as the cache's
    /// sibling content blob, not as part of the index payload.
    #[serde(skip)]
    pub file_contents: String,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl IndexFile {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let mut file = Self {
            version: 0,
            path: path.clone(),
            import_file: path,
            args: Vec::new(),
            language: LanguageId::Unknown,
            last_modification_time: 0,
            includes: Vec::new(),
            dependencies: Vec::new(),
            skipped_by_preprocessor: Vec::new(),
            types: Vec::new(),
            funcs: Vec::new(),
            vars: Vec::new(),
            id_cache: IdCache::default(),
            file_contents: String::new(),
            diagnostics: Vec::new(),
        };
        file.id_cache.primary_file = file.path.clone();
        file
    }

    /// Returns the local id for `usr`, allocating a fresh record when the USR
    /// has not been seen. Ids stay dense and zero-based.
    pub fn type_id_for_usr(&mut self, usr: &str) -> IndexTypeId {
        if let Some(&id) = self.id_cache.usr_to_type_id.get(usr) {
            return id;
        }
        let id = IndexTypeId(self.types.len() as u32);
        self.types.push(IndexType::new(id, usr.to_string()));
        self.id_cache.usr_to_type_id.insert(usr.to_string(), id);
        self.id_cache.type_id_to_usr.insert(id, usr.to_string());
        id
    }

    pub fn func_id_for_usr(&mut self, usr: &str) -> IndexFuncId {
        if let Some(&id) = self.id_cache.usr_to_func_id.get(usr) {
            return id;
        }
        let id = IndexFuncId(self.funcs.len() as u32);
        self.funcs.push(IndexFunc::new(id, usr.to_string()));
        self.id_cache.usr_to_func_id.insert(usr.to_string(), id);
        self.id_cache.func_id_to_usr.insert(id, usr.to_string());
        id
    }

    pub fn var_id_for_usr(&mut self, usr: &str) -> IndexVarId {
        if let Some(&id) = self.id_cache.usr_to_var_id.get(usr) {
            return id;
        }
        let id = IndexVarId(self.vars.len() as u32);
        self.vars.push(IndexVar::new(id, usr.to_string()));
        self.id_cache.usr_to_var_id.insert(usr.to_string(), id);
        self.id_cache.var_id_to_usr.insert(id, usr.to_string());
        id
    }

    pub fn type_mut(&mut self, id: IndexTypeId) -> &mut IndexType {
        &mut self.types[id.index()]
    }

    pub fn func_mut(&mut self, id: IndexFuncId) -> &mut IndexFunc {
        &mut self.funcs[id.index()]
    }

    pub fn var_mut(&mut self, id: IndexVarId) -> &mut IndexVar {
        &mut self.vars[id.index()]
    }

    /// Restores the state that is not part of the serialized payload.
    pub(crate) fn restore_after_load(&mut self, path: &str) {
        self.path = path.to_string();
        self.id_cache = IdCache {
            primary_file: self.path.clone(),
            ..IdCache::default()
        };
        for ty in &self.types {
            self.id_cache.usr_to_type_id.insert(ty.usr.clone(), ty.id);
            self.id_cache.type_id_to_usr.insert(ty.id, ty.usr.clone());
        }
        for func in &self.funcs {
            self.id_cache.usr_to_func_id.insert(func.usr.clone(), func.id);
            self.id_cache.func_id_to_usr.insert(func.id, func.usr.clone());
        }
        for var in &self.vars {
            self.id_cache.usr_to_var_id.insert(var.usr.clone(), var.id);
            self.id_cache.var_id_to_usr.insert(var.id, var.usr.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_allocation_is_dense_and_idempotent() {
        let mut file = IndexFile::new("/src/a.cc");
        let t0 = file.type_id_for_usr("c:@S@Foo");
        let t1 = file.type_id_for_usr("c:@S@Bar");
        assert_eq!(t0, IndexTypeId(0));
        assert_eq!(t1, IndexTypeId(1));
        assert_eq!(file.type_id_for_usr("c:@S@Foo"), t0);
        assert_eq!(file.types.len(), 2);

        let f0 = file.func_id_for_usr("c:@F@main#");
        assert_eq!(f0, IndexFuncId(0));
        assert_eq!(file.funcs[0].usr, "c:@F@main#");
    }

    #[test]
    fn restore_after_load_rebuilds_the_id_cache() {
        let mut file = IndexFile::new("/src/a.cc");
        file.type_id_for_usr("c:@S@Foo");
        file.var_id_for_usr("c:@v");

        let mut reloaded = file.clone();
        reloaded.id_cache = IdCache::default();
        reloaded.restore_after_load("/src/a.cc");

        assert_eq!(reloaded.id_cache, file.id_cache);
    }
}

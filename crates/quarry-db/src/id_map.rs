use crate::db::{
    QueryDatabase, QueryFileId, QueryFuncId, QueryFuncRef, QueryLocation, QueryTypeId, QueryVarId,
};
use quarry_core::Range;
use quarry_index::{FuncRef, IdCache, IndexFuncId, IndexTypeId, IndexVarId};

/// Translation table from one file's local symbol ids to the query
/// database's global ids.
///
/// Built when an index is admitted (allocating empty database slots for
/// never-seen USRs) and dropped once the file's update has been applied.
#[derive(Clone, Debug)]
pub struct IdMap {
    pub primary_file: QueryFileId,
    type_ids: Vec<QueryTypeId>,
    func_ids: Vec<QueryFuncId>,
    var_ids: Vec<QueryVarId>,
}

impl IdMap {
    pub fn new(db: &mut QueryDatabase, id_cache: &IdCache) -> Self {
        let primary_file = db.file_id_for_path(&id_cache.primary_file);

        // Local ids are dense and zero-based, so plain vectors suffice.
        let mut type_ids = vec![QueryTypeId(0); id_cache.type_id_to_usr.len()];
        for (&local, usr) in &id_cache.type_id_to_usr {
            type_ids[local.index()] = db.type_id_for_usr(usr);
        }
        let mut func_ids = vec![QueryFuncId(0); id_cache.func_id_to_usr.len()];
        for (&local, usr) in &id_cache.func_id_to_usr {
            func_ids[local.index()] = db.func_id_for_usr(usr);
        }
        let mut var_ids = vec![QueryVarId(0); id_cache.var_id_to_usr.len()];
        for (&local, usr) in &id_cache.var_id_to_usr {
            var_ids[local.index()] = db.var_id_for_usr(usr);
        }

        Self {
            primary_file,
            type_ids,
            func_ids,
            var_ids,
        }
    }

    #[inline]
    pub fn type_id(&self, local: IndexTypeId) -> QueryTypeId {
        self.type_ids[local.index()]
    }

    #[inline]
    pub fn func_id(&self, local: IndexFuncId) -> QueryFuncId {
        self.func_ids[local.index()]
    }

    #[inline]
    pub fn var_id(&self, local: IndexVarId) -> QueryVarId {
        self.var_ids[local.index()]
    }

    /// Attaches this map's file to an index-local range.
    #[inline]
    pub fn location(&self, range: Range) -> QueryLocation {
        QueryLocation {
            file: self.primary_file,
            range,
        }
    }

    #[inline]
    pub fn func_ref(&self, func_ref: &FuncRef) -> QueryFuncRef {
        QueryFuncRef {
            id: self.func_id(func_ref.id),
            loc: self.location(func_ref.loc),
        }
    }
}

use crate::db::{
    QueryFileDef, QueryFuncDef, QueryFuncId, QueryFuncRef, QueryLocation, QueryTypeDef,
    QueryTypeId, QueryVarDef, QueryVarId,
};
use crate::id_map::IdMap;
use quarry_index::{FuncDef, IndexFile, TypeDef, Usr, VarDef};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Full replacement of one symbol's definition payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefUpdate<TId, TDef> {
    pub id: TId,
    pub value: TDef,
}

/// Add/remove edit for one symbol's reference vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeableUpdate<TId, TValue> {
    pub id: TId,
    pub to_add: Vec<TValue>,
    pub to_remove: Vec<TValue>,
}

/// A delta taking the query database from "file at version A" to "file at
/// version B". All ids are global.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexUpdate {
    pub files_def_update: Vec<QueryFileDef>,

    pub types_removed: Vec<Usr>,
    pub types_def_update: Vec<DefUpdate<QueryTypeId, QueryTypeDef>>,
    pub types_derived: Vec<MergeableUpdate<QueryTypeId, QueryTypeId>>,
    pub types_instances: Vec<MergeableUpdate<QueryTypeId, QueryVarId>>,
    pub types_uses: Vec<MergeableUpdate<QueryTypeId, QueryLocation>>,

    pub funcs_removed: Vec<Usr>,
    pub funcs_def_update: Vec<DefUpdate<QueryFuncId, QueryFuncDef>>,
    pub funcs_declarations: Vec<MergeableUpdate<QueryFuncId, QueryLocation>>,
    pub funcs_derived: Vec<MergeableUpdate<QueryFuncId, QueryFuncId>>,
    pub funcs_callers: Vec<MergeableUpdate<QueryFuncId, QueryFuncRef>>,

    pub vars_removed: Vec<Usr>,
    pub vars_def_update: Vec<DefUpdate<QueryVarId, QueryVarDef>>,
    pub vars_uses: Vec<MergeableUpdate<QueryVarId, QueryLocation>>,
}

impl IndexUpdate {
    /// Computes the delta between a previously admitted index and its
    /// replacement. `previous` (with its map) is absent on first import.
    pub fn create_delta(
        previous_map: Option<&IdMap>,
        current_map: &IdMap,
        previous: Option<&IndexFile>,
        current: &IndexFile,
    ) -> IndexUpdate {
        let mut update = IndexUpdate::default();
        update.files_def_update.push(QueryFileDef {
            path: current.path.clone(),
            includes: current.includes.clone(),
            dependencies: current.dependencies.clone(),
            inactive_regions: current.skipped_by_preprocessor.clone(),
        });

        match (previous, previous_map) {
            (Some(previous), Some(previous_map)) => {
                update.delta_types(previous_map, current_map, previous, current);
                update.delta_funcs(previous_map, current_map, previous, current);
                update.delta_vars(previous_map, current_map, previous, current);
            }
            _ => {
                update.import_types(current_map, current);
                update.import_funcs(current_map, current);
                update.import_vars(current_map, current);
            }
        }

        update
    }

    /// Combines `other` into `self`; applying the result is equivalent to
    /// applying the two updates in sequence.
    pub fn merge(&mut self, other: IndexUpdate) {
        self.files_def_update.extend(other.files_def_update);

        self.types_removed.extend(other.types_removed);
        self.types_def_update.extend(other.types_def_update);
        self.types_derived.extend(other.types_derived);
        self.types_instances.extend(other.types_instances);
        self.types_uses.extend(other.types_uses);

        self.funcs_removed.extend(other.funcs_removed);
        self.funcs_def_update.extend(other.funcs_def_update);
        self.funcs_declarations.extend(other.funcs_declarations);
        self.funcs_derived.extend(other.funcs_derived);
        self.funcs_callers.extend(other.funcs_callers);

        self.vars_removed.extend(other.vars_removed);
        self.vars_def_update.extend(other.vars_def_update);
        self.vars_uses.extend(other.vars_uses);
    }

    fn import_types(&mut self, map: &IdMap, current: &IndexFile) {
        for ty in &current.types {
            let id = map.type_id(ty.id);
            let def = type_def_to_query(map, &ty.def);
            if def != QueryTypeDef::default() {
                self.types_def_update.push(DefUpdate { id, value: def });
            }
            push_add_only(&mut self.types_derived, id, ids(map, &ty.derived, IdMap::type_id));
            push_add_only(
                &mut self.types_instances,
                id,
                ids(map, &ty.instances, IdMap::var_id),
            );
            push_add_only(&mut self.types_uses, id, locations(map, &ty.uses));
        }
    }

    fn import_funcs(&mut self, map: &IdMap, current: &IndexFile) {
        for func in &current.funcs {
            let id = map.func_id(func.id);
            let def = func_def_to_query(map, &func.def);
            if def != QueryFuncDef::default() {
                self.funcs_def_update.push(DefUpdate { id, value: def });
            }
            push_add_only(
                &mut self.funcs_declarations,
                id,
                locations(map, &func.declarations),
            );
            push_add_only(&mut self.funcs_derived, id, ids(map, &func.derived, IdMap::func_id));
            push_add_only(
                &mut self.funcs_callers,
                id,
                func.callers.iter().map(|r| map.func_ref(r)).collect(),
            );
        }
    }

    fn import_vars(&mut self, map: &IdMap, current: &IndexFile) {
        for var in &current.vars {
            let id = map.var_id(var.id);
            let def = var_def_to_query(map, &var.def);
            if def != QueryVarDef::default() {
                self.vars_def_update.push(DefUpdate { id, value: def });
            }
            push_add_only(&mut self.vars_uses, id, locations(map, &var.uses));
        }
    }

    fn delta_types(
        &mut self,
        previous_map: &IdMap,
        current_map: &IdMap,
        previous: &IndexFile,
        current: &IndexFile,
    ) {
        let previous_by_usr: HashMap<&str, &quarry_index::IndexType> =
            previous.types.iter().map(|t| (t.usr.as_str(), t)).collect();
        let current_usrs: HashSet<&str> = current.types.iter().map(|t| t.usr.as_str()).collect();

        for ty in &current.types {
            let id = current_map.type_id(ty.id);
            let new_def = type_def_to_query(current_map, &ty.def);
            match previous_by_usr.get(ty.usr.as_str()) {
                None => {
                    if new_def != QueryTypeDef::default() {
                        self.types_def_update.push(DefUpdate { id, value: new_def });
                    }
                    push_add_only(
                        &mut self.types_derived,
                        id,
                        ids(current_map, &ty.derived, IdMap::type_id),
                    );
                    push_add_only(
                        &mut self.types_instances,
                        id,
                        ids(current_map, &ty.instances, IdMap::var_id),
                    );
                    push_add_only(&mut self.types_uses, id, locations(current_map, &ty.uses));
                }
                Some(old) => {
                    let old_def = type_def_to_query(previous_map, &old.def);
                    if new_def != old_def && new_def != QueryTypeDef::default() {
                        self.types_def_update.push(DefUpdate { id, value: new_def });
                    }
                    push_diff(
                        &mut self.types_derived,
                        id,
                        ids(previous_map, &old.derived, IdMap::type_id),
                        ids(current_map, &ty.derived, IdMap::type_id),
                    );
                    push_diff(
                        &mut self.types_instances,
                        id,
                        ids(previous_map, &old.instances, IdMap::var_id),
                        ids(current_map, &ty.instances, IdMap::var_id),
                    );
                    push_diff(
                        &mut self.types_uses,
                        id,
                        locations(previous_map, &old.uses),
                        locations(current_map, &ty.uses),
                    );
                }
            }
        }

        for old in &previous.types {
            if !current_usrs.contains(old.usr.as_str()) {
                self.types_removed.push(old.usr.clone());
            }
        }
    }

    fn delta_funcs(
        &mut self,
        previous_map: &IdMap,
        current_map: &IdMap,
        previous: &IndexFile,
        current: &IndexFile,
    ) {
        let previous_by_usr: HashMap<&str, &quarry_index::IndexFunc> =
            previous.funcs.iter().map(|f| (f.usr.as_str(), f)).collect();
        let current_usrs: HashSet<&str> = current.funcs.iter().map(|f| f.usr.as_str()).collect();

        for func in &current.funcs {
            let id = current_map.func_id(func.id);
            let new_def = func_def_to_query(current_map, &func.def);
            match previous_by_usr.get(func.usr.as_str()) {
                None => {
                    if new_def != QueryFuncDef::default() {
                        self.funcs_def_update.push(DefUpdate { id, value: new_def });
                    }
                    push_add_only(
                        &mut self.funcs_declarations,
                        id,
                        locations(current_map, &func.declarations),
                    );
                    push_add_only(
                        &mut self.funcs_derived,
                        id,
                        ids(current_map, &func.derived, IdMap::func_id),
                    );
                    push_add_only(
                        &mut self.funcs_callers,
                        id,
                        func.callers.iter().map(|r| current_map.func_ref(r)).collect(),
                    );
                }
                Some(old) => {
                    let old_def = func_def_to_query(previous_map, &old.def);
                    if new_def != old_def && new_def != QueryFuncDef::default() {
                        self.funcs_def_update.push(DefUpdate { id, value: new_def });
                    }
                    push_diff(
                        &mut self.funcs_declarations,
                        id,
                        locations(previous_map, &old.declarations),
                        locations(current_map, &func.declarations),
                    );
                    push_diff(
                        &mut self.funcs_derived,
                        id,
                        ids(previous_map, &old.derived, IdMap::func_id),
                        ids(current_map, &func.derived, IdMap::func_id),
                    );
                    push_diff(
                        &mut self.funcs_callers,
                        id,
                        old.callers.iter().map(|r| previous_map.func_ref(r)).collect(),
                        func.callers.iter().map(|r| current_map.func_ref(r)).collect(),
                    );
                }
            }
        }

        for old in &previous.funcs {
            if !current_usrs.contains(old.usr.as_str()) {
                self.funcs_removed.push(old.usr.clone());
            }
        }
    }

    fn delta_vars(
        &mut self,
        previous_map: &IdMap,
        current_map: &IdMap,
        previous: &IndexFile,
        current: &IndexFile,
    ) {
        let previous_by_usr: HashMap<&str, &quarry_index::IndexVar> =
            previous.vars.iter().map(|v| (v.usr.as_str(), v)).collect();
        let current_usrs: HashSet<&str> = current.vars.iter().map(|v| v.usr.as_str()).collect();

        for var in &current.vars {
            let id = current_map.var_id(var.id);
            let new_def = var_def_to_query(current_map, &var.def);
            match previous_by_usr.get(var.usr.as_str()) {
                None => {
                    if new_def != QueryVarDef::default() {
                        self.vars_def_update.push(DefUpdate { id, value: new_def });
                    }
                    push_add_only(&mut self.vars_uses, id, locations(current_map, &var.uses));
                }
                Some(old) => {
                    let old_def = var_def_to_query(previous_map, &old.def);
                    if new_def != old_def && new_def != QueryVarDef::default() {
                        self.vars_def_update.push(DefUpdate { id, value: new_def });
                    }
                    push_diff(
                        &mut self.vars_uses,
                        id,
                        locations(previous_map, &old.uses),
                        locations(current_map, &var.uses),
                    );
                }
            }
        }

        for old in &previous.vars {
            if !current_usrs.contains(old.usr.as_str()) {
                self.vars_removed.push(old.usr.clone());
            }
        }
    }
}

fn type_def_to_query(map: &IdMap, def: &TypeDef) -> QueryTypeDef {
    QueryTypeDef {
        short_name: def.short_name.clone(),
        detailed_name: def.detailed_name.clone(),
        kind: def.kind,
        hover: def.hover.clone(),
        definition_spelling: def.definition_spelling.map(|r| map.location(r)),
        definition_extent: def.definition_extent.map(|r| map.location(r)),
        alias_of: def.alias_of.map(|id| map.type_id(id)),
        parents: def.parents.iter().map(|&id| map.type_id(id)).collect(),
        types: def.types.iter().map(|&id| map.type_id(id)).collect(),
        funcs: def.funcs.iter().map(|&id| map.func_id(id)).collect(),
        vars: def.vars.iter().map(|&id| map.var_id(id)).collect(),
    }
}

fn func_def_to_query(map: &IdMap, def: &FuncDef) -> QueryFuncDef {
    QueryFuncDef {
        short_name: def.short_name.clone(),
        detailed_name: def.detailed_name.clone(),
        kind: def.kind,
        hover: def.hover.clone(),
        definition_spelling: def.definition_spelling.map(|r| map.location(r)),
        definition_extent: def.definition_extent.map(|r| map.location(r)),
        declaring_type: def.declaring_type.map(|id| map.type_id(id)),
        base: def.base.map(|id| map.func_id(id)),
        callees: def.callees.iter().map(|r| map.func_ref(r)).collect(),
    }
}

fn var_def_to_query(map: &IdMap, def: &VarDef) -> QueryVarDef {
    QueryVarDef {
        short_name: def.short_name.clone(),
        detailed_name: def.detailed_name.clone(),
        kind: def.kind,
        hover: def.hover.clone(),
        declaration: def.declaration.map(|r| map.location(r)),
        definition_spelling: def.definition_spelling.map(|r| map.location(r)),
        definition_extent: def.definition_extent.map(|r| map.location(r)),
        variable_type: def.variable_type.map(|id| map.type_id(id)),
        declaring_type: def.declaring_type.map(|id| map.type_id(id)),
    }
}

fn ids<TLocal: Copy, TGlobal>(
    map: &IdMap,
    locals: &[TLocal],
    translate: impl Fn(&IdMap, TLocal) -> TGlobal,
) -> Vec<TGlobal> {
    locals.iter().map(|&local| translate(map, local)).collect()
}

fn locations(map: &IdMap, ranges: &[quarry_core::Range]) -> Vec<QueryLocation> {
    ranges.iter().map(|&r| map.location(r)).collect()
}

fn push_add_only<TId, TValue>(
    out: &mut Vec<MergeableUpdate<TId, TValue>>,
    id: TId,
    to_add: Vec<TValue>,
) {
    if !to_add.is_empty() {
        out.push(MergeableUpdate {
            id,
            to_add,
            to_remove: Vec::new(),
        });
    }
}

fn push_diff<TId, TValue: Eq + Hash + Clone>(
    out: &mut Vec<MergeableUpdate<TId, TValue>>,
    id: TId,
    previous: Vec<TValue>,
    current: Vec<TValue>,
) {
    let previous_set: HashSet<&TValue> = previous.iter().collect();
    let current_set: HashSet<&TValue> = current.iter().collect();

    let to_add: Vec<TValue> = current
        .iter()
        .filter(|value| !previous_set.contains(value))
        .cloned()
        .collect();
    let to_remove: Vec<TValue> = previous
        .iter()
        .filter(|value| !current_set.contains(value))
        .cloned()
        .collect();

    if !to_add.is_empty() || !to_remove.is_empty() {
        out.push(MergeableUpdate { id, to_add, to_remove });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::QueryDatabase;
    use pretty_assertions::assert_eq;
    use quarry_core::Range;
    use quarry_index::IndexFile;

    fn file_with_type_use(path: &str, usr: &str, line: u32) -> IndexFile {
        let mut file = IndexFile::new(path);
        let id = file.type_id_for_usr(usr);
        file.type_mut(id).def.short_name = usr.trim_start_matches("c:@S@").to_string();
        file.type_mut(id).uses.push(Range::for_line(line));
        file
    }

    #[test]
    fn first_import_emits_defs_and_uses() {
        let mut db = QueryDatabase::new();
        let file = file_with_type_use("/src/a.cc", "c:@S@Foo", 3);
        let map = IdMap::new(&mut db, &file.id_cache);

        let update = IndexUpdate::create_delta(None, &map, None, &file);
        assert_eq!(update.files_def_update.len(), 1);
        assert_eq!(update.files_def_update[0].path, "/src/a.cc");
        assert_eq!(update.types_def_update.len(), 1);
        assert_eq!(update.types_uses.len(), 1);
        assert!(update.types_removed.is_empty());

        db.apply_index_update(&update);
        let foo = db.usr_to_type["c:@S@Foo"];
        assert_eq!(db.types[foo.index()].uses.len(), 1);
        assert_eq!(
            db.types[foo.index()].def.as_ref().unwrap().short_name,
            "Foo"
        );
    }

    #[test]
    fn delta_moves_a_use_and_removes_vanished_symbols() {
        let mut db = QueryDatabase::new();

        let mut old = file_with_type_use("/src/a.cc", "c:@S@Foo", 3);
        let bar = old.type_id_for_usr("c:@S@Bar");
        old.type_mut(bar).uses.push(Range::for_line(4));
        let old_map = IdMap::new(&mut db, &old.id_cache);
        db.apply_index_update(&IndexUpdate::create_delta(None, &old_map, None, &old));

        // Foo's use moved to line 9; Foo2 appears; Bar vanishes.
        let mut new = file_with_type_use("/src/a.cc", "c:@S@Foo", 9);
        let foo2 = new.type_id_for_usr("c:@S@Foo2");
        new.type_mut(foo2).uses.push(Range::for_line(10));

        let new_map = IdMap::new(&mut db, &new.id_cache);
        let update = IndexUpdate::create_delta(Some(&old_map), &new_map, Some(&old), &new);

        assert_eq!(update.types_removed, vec!["c:@S@Bar".to_string()]);
        db.apply_index_update(&update);

        let foo = db.usr_to_type["c:@S@Foo"];
        assert_eq!(db.types[foo.index()].uses.len(), 1);
        assert_eq!(db.types[foo.index()].uses[0].range, Range::for_line(9));

        let bar = db.usr_to_type["c:@S@Bar"];
        assert!(db.types[bar.index()].def.is_none());

        let foo2 = db.usr_to_type["c:@S@Foo2"];
        assert_eq!(db.types[foo2.index()].uses.len(), 1);
    }

    #[test]
    fn unchanged_defs_are_not_reemitted() {
        let mut db = QueryDatabase::new();
        let old = file_with_type_use("/src/a.cc", "c:@S@Foo", 3);
        let old_map = IdMap::new(&mut db, &old.id_cache);
        db.apply_index_update(&IndexUpdate::create_delta(None, &old_map, None, &old));

        let new = old.clone();
        let new_map = IdMap::new(&mut db, &new.id_cache);
        let update = IndexUpdate::create_delta(Some(&old_map), &new_map, Some(&old), &new);

        assert!(update.types_def_update.is_empty());
        assert!(update.types_uses.is_empty());
        assert!(update.types_removed.is_empty());
    }

    #[test]
    fn merge_then_apply_matches_sequential_application() {
        let mut db = QueryDatabase::new();

        let a = file_with_type_use("/src/a.cc", "c:@S@A", 1);
        let b = file_with_type_use("/src/b.cc", "c:@S@B", 2);
        let a_map = IdMap::new(&mut db, &a.id_cache);
        let b_map = IdMap::new(&mut db, &b.id_cache);

        let update_a = IndexUpdate::create_delta(None, &a_map, None, &a);
        let update_b = IndexUpdate::create_delta(None, &b_map, None, &b);

        let mut sequential = db.clone();
        sequential.apply_index_update(&update_a);
        sequential.apply_index_update(&update_b);

        let mut merged_update = update_a;
        merged_update.merge(update_b);
        let mut merged = db.clone();
        merged.apply_index_update(&merged_update);

        assert_eq!(sequential, merged);
    }
}

//! Explicit conversion from merged option documents to driver option types.
//!
//! The merge layer works on plain BSON documents so that layering stays a
//! shallow key-by-key operation; this module translates the merged result
//! into the `mongodb` crate's typed option structs right before delegation.
//! Unknown keys are ignored, malformed values for known keys fail with
//! [`ProviderError::InvalidArgument`](crate::error::ProviderError).

use std::time::Duration;

use bson::{Bson, Document};
use mongodb::options::{
    AggregateOptions, BulkWriteOptions, ChangeStreamOptions, Collation, CountOptions,
    CreateCollectionOptions, CreateIndexOptions, DatabaseOptions, DeleteOptions, DistinctOptions,
    DropCollectionOptions, DropDatabaseOptions, EstimatedDocumentCountOptions,
    FindOneAndDeleteOptions, FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOptions,
    FullDocumentType, Hint, InsertManyOptions, InsertOneOptions, ReadConcern, ReadPreference,
    ReplaceOptions, ReturnDocument, RunCommandOptions, SelectionCriteria, UpdateOptions,
    WriteConcern,
};
use mongodb::options::Acknowledgment;

use crate::error::{ProviderError, Result};

/* ========================= Field extraction helpers ========================= */

fn get_bool(options: &Document, key: &str) -> Option<bool> {
    options.get(key).and_then(Bson::as_bool)
}

fn as_int(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

fn get_i64(options: &Document, key: &str) -> Option<i64> {
    options.get(key).and_then(as_int)
}

fn get_u64(options: &Document, key: &str) -> Option<u64> {
    get_i64(options, key).and_then(|v| u64::try_from(v).ok())
}

fn get_u32(options: &Document, key: &str) -> Option<u32> {
    get_i64(options, key).and_then(|v| u32::try_from(v).ok())
}

fn get_document(options: &Document, key: &str) -> Option<Document> {
    options.get_document(key).ok().cloned()
}

fn get_duration_ms(options: &Document, key: &str) -> Option<Duration> {
    get_u64(options, key).map(Duration::from_millis)
}

fn get_hint(options: &Document, key: &str) -> Option<Hint> {
    match options.get(key) {
        Some(Bson::Document(keys)) => Some(Hint::Keys(keys.clone())),
        Some(Bson::String(name)) => Some(Hint::Name(name.clone())),
        _ => None,
    }
}

fn get_collation(options: &Document) -> Result<Option<Collation>> {
    match options.get_document("collation") {
        Ok(doc) => {
            let collation = bson::from_document(doc.clone()).map_err(|e| {
                ProviderError::InvalidArgument(format!("invalid collation: {e}"))
            })?;
            Ok(Some(collation))
        }
        Err(_) => Ok(None),
    }
}

fn get_array_filters(options: &Document) -> Option<Vec<Document>> {
    let filters = options.get_array("arrayFilters").ok()?;
    Some(
        filters
            .iter()
            .filter_map(|b| b.as_document().cloned())
            .collect(),
    )
}

/* ========================= Concern / preference conversion ========================= */

/// Parse a read concern from either `"majority"` or `{ level: "majority" }`.
pub fn read_concern_from(value: &Bson) -> Result<ReadConcern> {
    let level = match value {
        Bson::String(level) => level.as_str(),
        Bson::Document(doc) => doc.get_str("level").map_err(|_| {
            ProviderError::InvalidArgument("readConcern document requires a level".to_string())
        })?,
        other => {
            return Err(ProviderError::InvalidArgument(format!(
                "invalid readConcern: {other}"
            )));
        }
    };

    Ok(match level {
        "local" => ReadConcern::local(),
        "majority" => ReadConcern::majority(),
        "linearizable" => ReadConcern::linearizable(),
        "available" => ReadConcern::available(),
        "snapshot" => ReadConcern::snapshot(),
        other => ReadConcern::custom(other),
    })
}

/// Parse a write concern from `{ w, j, wtimeoutMS }`.
pub fn write_concern_from(doc: &Document) -> Result<WriteConcern> {
    let mut concern = WriteConcern::default();

    match doc.get("w") {
        Some(Bson::String(tag)) if tag == "majority" => {
            concern.w = Some(Acknowledgment::Majority);
        }
        Some(Bson::String(tag)) => {
            concern.w = Some(Acknowledgment::Custom(tag.clone()));
        }
        Some(value) => {
            let nodes = as_int(value).and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
                ProviderError::InvalidArgument(format!("invalid writeConcern w: {value}"))
            })?;
            concern.w = Some(Acknowledgment::Nodes(nodes));
        }
        None => {}
    }

    concern.journal = get_bool(doc, "j");
    concern.w_timeout = get_duration_ms(doc, "wtimeoutMS").or_else(|| get_duration_ms(doc, "wtimeout"));

    Ok(concern)
}

fn get_write_concern(options: &Document) -> Result<Option<WriteConcern>> {
    match options.get_document("writeConcern") {
        Ok(doc) => Ok(Some(write_concern_from(doc)?)),
        Err(_) => Ok(None),
    }
}

/// Parse a read preference from either `"secondary"` or `{ mode: "secondary" }`.
///
/// Tag sets and hedge options are not carried over; mode selection is what
/// the shell surface drives through this layer.
pub fn read_preference_from(value: &Bson) -> Result<SelectionCriteria> {
    let mode = match value {
        Bson::String(mode) => mode.as_str(),
        Bson::Document(doc) => doc.get_str("mode").map_err(|_| {
            ProviderError::InvalidArgument("readPreference document requires a mode".to_string())
        })?,
        other => {
            return Err(ProviderError::InvalidArgument(format!(
                "invalid readPreference: {other}"
            )));
        }
    };

    let preference = match mode {
        "primary" => ReadPreference::Primary,
        "primaryPreferred" => ReadPreference::PrimaryPreferred {
            options: Default::default(),
        },
        "secondary" => ReadPreference::Secondary {
            options: Default::default(),
        },
        "secondaryPreferred" => ReadPreference::SecondaryPreferred {
            options: Default::default(),
        },
        "nearest" => ReadPreference::Nearest {
            options: Default::default(),
        },
        other => {
            return Err(ProviderError::InvalidArgument(format!(
                "unknown readPreference mode: {other}"
            )));
        }
    };

    Ok(SelectionCriteria::ReadPreference(preference))
}

/// Convert a db-option document into the driver's `DatabaseOptions`.
///
/// These are the options that participate in the handle-cache key.
pub fn to_database_options(options: &Document) -> Result<DatabaseOptions> {
    let mut db_options = DatabaseOptions::default();

    if let Some(value) = options.get("readConcern") {
        db_options.read_concern = Some(read_concern_from(value)?);
    }
    db_options.write_concern = get_write_concern(options)?;
    if let Some(value) = options.get("readPreference") {
        db_options.selection_criteria = Some(read_preference_from(value)?);
    }

    Ok(db_options)
}

/* ========================= Per-operation conversion ========================= */

pub fn to_find_options(options: &Document) -> Result<FindOptions> {
    let mut find_options = FindOptions::default();

    find_options.limit = get_i64(options, "limit");
    find_options.skip = get_u64(options, "skip");
    find_options.batch_size = get_u32(options, "batchSize");
    find_options.sort = get_document(options, "sort");
    find_options.projection = get_document(options, "projection");
    find_options.max_time = get_duration_ms(options, "maxTimeMS");
    find_options.allow_partial_results = get_bool(options, "allowPartialResults");
    find_options.no_cursor_timeout = get_bool(options, "noCursorTimeout");
    find_options.allow_disk_use = get_bool(options, "allowDiskUse");
    find_options.hint = get_hint(options, "hint");
    find_options.collation = get_collation(options)?;

    Ok(find_options)
}

pub fn to_aggregate_options(options: &Document) -> Result<AggregateOptions> {
    let mut aggregate_options = AggregateOptions::default();

    aggregate_options.allow_disk_use = get_bool(options, "allowDiskUse");
    aggregate_options.batch_size = get_u32(options, "batchSize");
    aggregate_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    aggregate_options.max_time = get_duration_ms(options, "maxTimeMS");
    aggregate_options.hint = get_hint(options, "hint");
    aggregate_options.collation = get_collation(options)?;
    aggregate_options.write_concern = get_write_concern(options)?;

    Ok(aggregate_options)
}

pub fn to_count_options(options: &Document) -> Result<CountOptions> {
    let mut count_options = CountOptions::default();

    count_options.limit = get_u64(options, "limit");
    count_options.skip = get_u64(options, "skip");
    count_options.max_time = get_duration_ms(options, "maxTimeMS");
    count_options.hint = get_hint(options, "hint");
    count_options.collation = get_collation(options)?;

    Ok(count_options)
}

pub fn to_estimated_count_options(options: &Document) -> Result<EstimatedDocumentCountOptions> {
    let mut estimated_options = EstimatedDocumentCountOptions::default();

    estimated_options.max_time = get_duration_ms(options, "maxTimeMS");

    Ok(estimated_options)
}

pub fn to_distinct_options(options: &Document) -> Result<DistinctOptions> {
    let mut distinct_options = DistinctOptions::default();

    distinct_options.max_time = get_duration_ms(options, "maxTimeMS");
    distinct_options.collation = get_collation(options)?;

    Ok(distinct_options)
}

pub fn to_insert_one_options(options: &Document) -> Result<InsertOneOptions> {
    let mut insert_options = InsertOneOptions::default();

    insert_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    insert_options.write_concern = get_write_concern(options)?;

    Ok(insert_options)
}

pub fn to_insert_many_options(options: &Document) -> Result<InsertManyOptions> {
    let mut insert_options = InsertManyOptions::default();

    insert_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    insert_options.ordered = get_bool(options, "ordered");
    insert_options.write_concern = get_write_concern(options)?;

    Ok(insert_options)
}

pub fn to_update_options(options: &Document) -> Result<UpdateOptions> {
    let mut update_options = UpdateOptions::default();

    update_options.array_filters = get_array_filters(options);
    update_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    update_options.upsert = get_bool(options, "upsert");
    update_options.hint = get_hint(options, "hint");
    update_options.collation = get_collation(options)?;
    update_options.write_concern = get_write_concern(options)?;

    Ok(update_options)
}

pub fn to_replace_options(options: &Document) -> Result<ReplaceOptions> {
    let mut replace_options = ReplaceOptions::default();

    replace_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    replace_options.upsert = get_bool(options, "upsert");
    replace_options.hint = get_hint(options, "hint");
    replace_options.collation = get_collation(options)?;
    replace_options.write_concern = get_write_concern(options)?;

    Ok(replace_options)
}

pub fn to_delete_options(options: &Document) -> Result<DeleteOptions> {
    let mut delete_options = DeleteOptions::default();

    delete_options.hint = get_hint(options, "hint");
    delete_options.collation = get_collation(options)?;
    delete_options.write_concern = get_write_concern(options)?;

    Ok(delete_options)
}

fn return_document_from(options: &Document) -> Result<Option<ReturnDocument>> {
    match options.get_str("returnDocument") {
        Ok("after") => Ok(Some(ReturnDocument::After)),
        Ok("before") => Ok(Some(ReturnDocument::Before)),
        Ok(other) => Err(ProviderError::InvalidArgument(format!(
            "invalid returnDocument: {other}"
        ))),
        Err(_) => Ok(None),
    }
}

pub fn to_find_one_and_delete_options(options: &Document) -> Result<FindOneAndDeleteOptions> {
    let mut fod_options = FindOneAndDeleteOptions::default();

    fod_options.max_time = get_duration_ms(options, "maxTimeMS");
    fod_options.projection = get_document(options, "projection");
    fod_options.sort = get_document(options, "sort");
    fod_options.collation = get_collation(options)?;
    fod_options.write_concern = get_write_concern(options)?;

    Ok(fod_options)
}

pub fn to_find_one_and_update_options(options: &Document) -> Result<FindOneAndUpdateOptions> {
    let mut fou_options = FindOneAndUpdateOptions::default();

    fou_options.array_filters = get_array_filters(options);
    fou_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    fou_options.max_time = get_duration_ms(options, "maxTimeMS");
    fou_options.projection = get_document(options, "projection");
    fou_options.sort = get_document(options, "sort");
    fou_options.upsert = get_bool(options, "upsert");
    fou_options.return_document = return_document_from(options)?;
    fou_options.collation = get_collation(options)?;
    fou_options.write_concern = get_write_concern(options)?;

    Ok(fou_options)
}

pub fn to_find_one_and_replace_options(options: &Document) -> Result<FindOneAndReplaceOptions> {
    let mut foa_options = FindOneAndReplaceOptions::default();

    foa_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");
    foa_options.max_time = get_duration_ms(options, "maxTimeMS");
    foa_options.projection = get_document(options, "projection");
    foa_options.sort = get_document(options, "sort");
    foa_options.upsert = get_bool(options, "upsert");
    foa_options.return_document = return_document_from(options)?;
    foa_options.collation = get_collation(options)?;
    foa_options.write_concern = get_write_concern(options)?;

    Ok(foa_options)
}

pub fn to_create_collection_options(options: &Document) -> Result<CreateCollectionOptions> {
    let mut create_options = CreateCollectionOptions::default();

    create_options.capped = get_bool(options, "capped");
    create_options.size = get_u64(options, "size");
    create_options.max = get_u64(options, "max");
    create_options.validator = get_document(options, "validator");
    create_options.write_concern = get_write_concern(options)?;

    Ok(create_options)
}

pub fn to_create_index_options(options: &Document) -> Result<CreateIndexOptions> {
    let mut index_options = CreateIndexOptions::default();

    index_options.max_time = get_duration_ms(options, "maxTimeMS");
    index_options.write_concern = get_write_concern(options)?;

    Ok(index_options)
}

pub fn to_drop_collection_options(options: &Document) -> Result<DropCollectionOptions> {
    let mut drop_options = DropCollectionOptions::default();

    drop_options.write_concern = get_write_concern(options)?;

    Ok(drop_options)
}

pub fn to_drop_database_options(options: &Document) -> Result<DropDatabaseOptions> {
    let mut drop_options = DropDatabaseOptions::default();

    drop_options.write_concern = get_write_concern(options)?;

    Ok(drop_options)
}

pub fn to_run_command_options(options: &Document) -> Result<RunCommandOptions> {
    let mut run_options = RunCommandOptions::default();

    if let Some(value) = options.get("readPreference") {
        run_options.selection_criteria = Some(read_preference_from(value)?);
    }

    Ok(run_options)
}

pub fn to_change_stream_options(options: &Document) -> Result<ChangeStreamOptions> {
    let mut stream_options = ChangeStreamOptions::default();

    stream_options.batch_size = get_u32(options, "batchSize");
    stream_options.max_await_time = get_duration_ms(options, "maxAwaitTimeMS");
    stream_options.full_document = match options.get_str("fullDocument") {
        Ok("updateLookup") => Some(FullDocumentType::UpdateLookup),
        Ok("whenAvailable") => Some(FullDocumentType::WhenAvailable),
        Ok("required") => Some(FullDocumentType::Required),
        Ok(other) => {
            return Err(ProviderError::InvalidArgument(format!(
                "invalid fullDocument: {other}"
            )));
        }
        Err(_) => None,
    };

    Ok(stream_options)
}

pub fn to_bulk_write_options(options: &Document, ordered: bool) -> Result<BulkWriteOptions> {
    let mut bulk_options = BulkWriteOptions::default();

    bulk_options.ordered = Some(ordered);
    bulk_options.bypass_document_validation = get_bool(options, "bypassDocumentValidation");

    Ok(bulk_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_find_options_mapping() {
        let merged = doc! {
            "limit": 10,
            "skip": 5,
            "sort": { "age": -1 },
            "maxTimeMS": 2500,
            "allowPartialResults": true,
            "serializeFunctions": true,
        };
        let opts = to_find_options(&merged).unwrap();

        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.skip, Some(5));
        assert_eq!(opts.sort, Some(doc! { "age": -1 }));
        assert_eq!(opts.max_time, Some(Duration::from_millis(2500)));
        assert_eq!(opts.allow_partial_results, Some(true));
        // Unknown keys pass through the merge but never reach the driver.
        assert_eq!(opts.no_cursor_timeout, None);
    }

    #[test]
    fn test_hint_accepts_name_and_keys() {
        assert!(matches!(
            get_hint(&doc! { "hint": "age_1" }, "hint"),
            Some(Hint::Name(_))
        ));
        assert!(matches!(
            get_hint(&doc! { "hint": { "age": 1 } }, "hint"),
            Some(Hint::Keys(_))
        ));
    }

    #[test]
    fn test_read_concern_levels() {
        let majority = read_concern_from(&Bson::String("majority".to_string())).unwrap();
        assert_eq!(
            format!("{majority:?}"),
            format!("{:?}", ReadConcern::majority())
        );

        let local = read_concern_from(&Bson::Document(doc! { "level": "local" })).unwrap();
        assert_eq!(format!("{local:?}"), format!("{:?}", ReadConcern::local()));

        assert!(read_concern_from(&Bson::Int32(1)).is_err());
    }

    #[test]
    fn test_write_concern_mapping() {
        let concern = write_concern_from(&doc! { "w": "majority", "j": true, "wtimeoutMS": 100 })
            .unwrap();
        assert!(matches!(concern.w, Some(Acknowledgment::Majority)));
        assert_eq!(concern.journal, Some(true));
        assert_eq!(concern.w_timeout, Some(Duration::from_millis(100)));

        let numeric = write_concern_from(&doc! { "w": 2 }).unwrap();
        assert!(matches!(numeric.w, Some(Acknowledgment::Nodes(2))));
    }

    #[test]
    fn test_read_preference_modes() {
        assert!(read_preference_from(&Bson::String("primary".to_string())).is_ok());
        assert!(read_preference_from(&Bson::Document(doc! { "mode": "nearest" })).is_ok());
        assert!(read_preference_from(&Bson::String("sideways".to_string())).is_err());
    }

    #[test]
    fn test_return_document_validation() {
        let opts = to_find_one_and_update_options(&doc! { "returnDocument": "after" }).unwrap();
        assert!(matches!(opts.return_document, Some(ReturnDocument::After)));

        assert!(to_find_one_and_update_options(&doc! { "returnDocument": "sideways" }).is_err());
    }

    #[test]
    fn test_database_options_from_document() {
        let db_options = to_database_options(&doc! {
            "readConcern": { "level": "majority" },
            "writeConcern": { "w": 1 },
            "readPreference": "secondaryPreferred",
        })
        .unwrap();

        assert_eq!(
            format!("{:?}", db_options.read_concern),
            format!("{:?}", Some(ReadConcern::majority()))
        );
        assert!(db_options.write_concern.is_some());
        assert!(db_options.selection_criteria.is_some());
    }
}

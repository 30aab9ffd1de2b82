//! Mapping between blob records and DynamoDB items.

use crate::client::{ClientError, ClientResult};
use aws_sdk_dynamodb::types::AttributeValue;
use lakeside_core::{Blob, BlobId, BlobMetadata, Tag};
use std::collections::HashMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A DynamoDB item.
pub type Item = HashMap<String, AttributeValue>;

/// Encode a tag as `{name: S, value: S | NULL}`.
pub fn tag_attribute(tag: &Tag) -> AttributeValue {
    let value = match &tag.value {
        Some(value) => AttributeValue::S(value.clone()),
        None => AttributeValue::Null(true),
    };
    AttributeValue::M(HashMap::from([
        ("name".to_string(), AttributeValue::S(tag.name.clone())),
        ("value".to_string(), value),
    ]))
}

fn tag_list(tags: &[Tag]) -> AttributeValue {
    AttributeValue::L(tags.iter().map(tag_attribute).collect())
}

/// Encode a finalized record. The payload lives in the object store.
pub fn to_item(meta: &BlobMetadata) -> ClientResult<Item> {
    let timestamp = meta
        .timestamp
        .format(&Rfc3339)
        .map_err(|e| ClientError::Rejected(format!("timestamp: {e}")))?;

    Ok(HashMap::from([
        ("id".to_string(), AttributeValue::S(meta.id.to_string())),
        ("name".to_string(), AttributeValue::S(meta.name.clone())),
        (
            "content_type".to_string(),
            AttributeValue::S(meta.content_type.clone()),
        ),
        ("timestamp".to_string(), AttributeValue::S(timestamp)),
        ("source".to_string(), AttributeValue::S(meta.source.clone())),
        ("user_tags".to_string(), tag_list(&meta.user_tags)),
        ("system_tags".to_string(), tag_list(&meta.system_tags)),
        ("size".to_string(), AttributeValue::N(meta.size.to_string())),
    ]))
}

fn string<'a>(item: &'a Item, field: &str) -> ClientResult<&'a str> {
    match item.get(field) {
        Some(AttributeValue::S(value)) => Ok(value),
        _ => Err(ClientError::Decode(format!("item field {field} is not a string"))),
    }
}

fn tags(item: &Item, field: &str) -> ClientResult<Vec<Tag>> {
    let list = match item.get(field) {
        Some(AttributeValue::L(list)) => list,
        None => return Ok(Vec::new()),
        _ => return Err(ClientError::Decode(format!("item field {field} is not a list"))),
    };

    list.iter()
        .map(|entry| {
            let AttributeValue::M(map) = entry else {
                return Err(ClientError::Decode(format!("{field} entry is not a map")));
            };
            let name = match map.get("name") {
                Some(AttributeValue::S(name)) => name.clone(),
                _ => return Err(ClientError::Decode(format!("{field} entry has no name"))),
            };
            let value = match map.get("value") {
                Some(AttributeValue::S(value)) => Some(value.clone()),
                Some(AttributeValue::Null(_)) | None => None,
                _ => return Err(ClientError::Decode(format!("{field} entry value is not a string"))),
            };
            Ok(Tag { name, value })
        })
        .collect()
}

/// Decode a search result.
pub fn from_item(item: &Item) -> ClientResult<Blob> {
    let id = BlobId::parse(string(item, "id")?).map_err(|e| ClientError::Decode(e.to_string()))?;
    let timestamp = OffsetDateTime::parse(string(item, "timestamp")?, &Rfc3339)
        .map_err(|e| ClientError::Decode(format!("timestamp: {e}")))?;
    let size = match item.get("size") {
        Some(AttributeValue::N(n)) => n
            .parse::<u64>()
            .map_err(|e| ClientError::Decode(format!("size: {e}")))?,
        _ => return Err(ClientError::Decode("item field size is not a number".to_string())),
    };

    Ok(Blob {
        id,
        name: string(item, "name")?.to_string(),
        content_type: string(item, "content_type")?.to_string(),
        timestamp,
        source: string(item, "source")?.to_string(),
        user_tags: tags(item, "user_tags")?,
        system_tags: tags(item, "system_tags")?,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeside_core::{BlobCreate, ProcessedPayload};
    use time::macros::datetime;

    #[test]
    fn test_item_roundtrip() {
        let create = BlobCreate {
            timestamp: datetime!(2024-05-01 08:00:00 UTC),
            ..BlobCreate::new("reading")
        }
        .with_user_tags(vec![Tag::new("env", "prod"), Tag::bare("draft")]);
        let meta = BlobMetadata::staged(BlobId::new(), create).finalize_with(
            &ProcessedPayload::new(&b"abc"[..], vec![Tag::new("content-type", "text/plain")]),
        );

        let item = to_item(&meta).unwrap();
        assert_eq!(item["size"], AttributeValue::N("3".to_string()));

        let blob = from_item(&item).unwrap();
        assert_eq!(blob, Blob::from(meta));
    }

    #[test]
    fn test_absent_value_is_null() {
        let AttributeValue::M(map) = tag_attribute(&Tag::bare("draft")) else {
            panic!("expected map");
        };
        assert_eq!(map["value"], AttributeValue::Null(true));
    }

    #[test]
    fn test_bad_item_is_rejected() {
        let mut item = to_item(&BlobMetadata::staged(BlobId::new(), BlobCreate::new("x"))).unwrap();
        item.insert("size".to_string(), AttributeValue::S("big".to_string()));
        assert!(matches!(from_item(&item), Err(ClientError::Decode(_))));
    }
}

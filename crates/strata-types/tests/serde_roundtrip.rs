use chrono::Utc;
use strata_types::{Digest, DigestAlgorithm, Event, EventBody, VersionedId};
use uuid::Uuid;

#[test]
fn event_body_tag_is_snake_case_type_field() {
    let body = EventBody::OwnerAdd { owner: "alice".into() };
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["type"], "owner_add");
    assert_eq!(json["owner"], "alice");
}

#[test]
fn event_roundtrips_through_json() {
    let event = Event::new(
        Uuid::new_v4(),
        "alice".into(),
        Utc::now(),
        EventBody::ObjectDelete {
            object_identifier: VersionedId::new(Uuid::new_v4(), 3),
        },
    );
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(event, back);
}

#[test]
fn digest_hex_roundtrip() {
    let digest = Digest::sha256(b"hello world");
    let hex = digest.to_hex();
    let parsed = Digest::from_hex(DigestAlgorithm::Sha256, &hex).unwrap();
    assert_eq!(digest, parsed);
}

#[test]
fn every_event_kind_tags_distinctly() {
    let uuid = Uuid::new_v4();
    let vid = VersionedId::new(uuid, 0);
    let kinds = [
        EventBody::OwnerAdd { owner: "a".into() }.kind_tag(),
        EventBody::OwnerRemove { owner: "a".into() }.kind_tag(),
        EventBody::ObjectDelete { object_identifier: vid }.kind_tag(),
        EventBody::SchemaDeprecate { schema_identifier: vid }.kind_tag(),
        EventBody::AnnotationDelete { annotation_identifier: vid }.kind_tag(),
        EventBody::ReviewAccept { event_uuid: uuid }.kind_tag(),
        EventBody::ReviewReject { event_uuid: uuid }.kind_tag(),
    ];
    let unique: std::collections::HashSet<_> = kinds.iter().collect();
    assert_eq!(unique.len(), kinds.len());
}

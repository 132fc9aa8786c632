//! Idempotent prototype catalog bootstrap (spec §9 "global mutable
//! state... the seeded prototype catalog"; SPEC_FULL §2).
//!
//! Called once at process start. `createPrototype` is itself idempotent
//! for an unchanged schema, so re-running this at every startup is safe.

use crate::error::Result;
use crate::ksg::Ksg;
use crate::types::{Cardinality, PropertyDef, ValueType};

/// Seeds the canonical prototype catalog referenced throughout spec §3:
/// Procedure, ProcedureStep, ProcedureRun, ProcedureSchema, QueueItem,
/// Queue, Relationship, the Vault family (Credential/Identity/
/// PaymentMethod/FormData), Knowledge/Lesson, FormPattern, and TimeRule.
pub async fn seed_prototypes(ksg: &Ksg) -> Result<()> {
    ksg.create_prototype(
        "Procedure",
        None,
        vec![
            PropertyDef::new("name", ValueType::String, Cardinality::ExactlyOne),
            PropertyDef::new("description", ValueType::String, Cardinality::ZeroOrOne),
            PropertyDef::new("tested", ValueType::Number, Cardinality::ZeroOrOne).with_default(serde_json::json!(0)),
            PropertyDef::new("success", ValueType::Number, Cardinality::ZeroOrOne).with_default(serde_json::json!(0)),
            PropertyDef::new("failure", ValueType::Number, Cardinality::ZeroOrOne).with_default(serde_json::json!(0)),
        ],
    )
    .await?;

    ksg.create_prototype(
        "ProcedureStep",
        None,
        vec![
            PropertyDef::new("tool", ValueType::String, Cardinality::ExactlyOne),
            PropertyDef::new("params", ValueType::Json, Cardinality::ZeroOrOne),
            PropertyDef::new("guard", ValueType::Json, Cardinality::ZeroOrOne),
            PropertyDef::new("on_fail", ValueType::String, Cardinality::ZeroOrOne)
                .with_default(serde_json::json!("stop")),
        ],
    )
    .await?;

    ksg.create_prototype("ProcedureRun", None, vec![]).await?;
    ksg.create_prototype("ProcedureSchema", None, vec![]).await?;

    ksg.create_prototype(
        "QueueItem",
        None,
        vec![
            PropertyDef::new("state", ValueType::String, Cardinality::ExactlyOne)
                .with_default(serde_json::json!("queued")),
            PropertyDef::new("priority", ValueType::Number, Cardinality::ZeroOrOne)
                .with_default(serde_json::json!(0)),
        ],
    )
    .await?;
    ksg.create_prototype("Queue", None, vec![]).await?;
    ksg.create_prototype("Relationship", None, vec![]).await?;

    ksg.create_prototype("Vault", None, vec![]).await?;
    ksg.create_prototype(
        "Credential",
        Some("Vault"),
        vec![
            PropertyDef::new("domain", ValueType::String, Cardinality::ExactlyOne),
            PropertyDef::new("recallCount", ValueType::Number, Cardinality::ZeroOrOne)
                .with_default(serde_json::json!(0)),
        ],
    )
    .await?;
    ksg.create_prototype("Identity", Some("Vault"), vec![PropertyDef::new("domain", ValueType::String, Cardinality::ZeroOrOne)])
        .await?;
    ksg.create_prototype(
        "PaymentMethod",
        Some("Vault"),
        vec![PropertyDef::new("domain", ValueType::String, Cardinality::ZeroOrOne)],
    )
    .await?;
    ksg.create_prototype("FormData", Some("Vault"), vec![PropertyDef::new("domain", ValueType::String, Cardinality::ZeroOrOne)])
        .await?;

    ksg.create_prototype("Knowledge", None, vec![]).await?;
    ksg.create_prototype("Lesson", Some("Knowledge"), vec![]).await?;
    ksg.create_prototype("FormPattern", None, vec![]).await?;
    ksg.create_prototype("TimeRule", None, vec![]).await?;

    Ok(())
}

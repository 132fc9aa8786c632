//! Core data model (spec §3): nodes, edges, provenance, and the canonical
//! kind/relation vocabulary shared by every component.

mod edge;
mod node;
mod provenance;

pub use edge::Edge;
pub use node::{Node, NodeStatus};
pub use provenance::Provenance;

use serde::{Deserialize, Serialize};

/// Canonical node kinds (spec §3). Stored as a plain string tag on [`Node`]
/// so pluggable stores need not know the closed set, but the core always
/// produces one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Prototype,
    Concept,
    PropertyDef,
    Value,
    Procedure,
    ProcedureStep,
    ProcedureRun,
    ProcedureSchema,
    QueueItem,
    Queue,
    Relationship,
    Credential,
    Identity,
    PaymentMethod,
    FormData,
    Knowledge,
    Lesson,
    FormPattern,
    TimeRule,
}

impl NodeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Prototype => "Prototype",
            NodeKind::Concept => "Concept",
            NodeKind::PropertyDef => "PropertyDef",
            NodeKind::Value => "Value",
            NodeKind::Procedure => "Procedure",
            NodeKind::ProcedureStep => "ProcedureStep",
            NodeKind::ProcedureRun => "ProcedureRun",
            NodeKind::ProcedureSchema => "ProcedureSchema",
            NodeKind::QueueItem => "QueueItem",
            NodeKind::Queue => "Queue",
            NodeKind::Relationship => "Relationship",
            NodeKind::Credential => "Credential",
            NodeKind::Identity => "Identity",
            NodeKind::PaymentMethod => "PaymentMethod",
            NodeKind::FormData => "FormData",
            NodeKind::Knowledge => "Knowledge",
            NodeKind::Lesson => "Lesson",
            NodeKind::FormPattern => "FormPattern",
            NodeKind::TimeRule => "TimeRule",
        }
    }
}

/// Canonical edge relations (spec §3).
pub mod rel {
    pub const INSTANCE_OF: &str = "instanceOf";
    pub const INHERITS: &str = "inherits";
    pub const HAS_STEP: &str = "hasStep";
    pub const DEPENDS_ON: &str = "dependsOn";
    pub const BRANCH_TRUE: &str = "branchTrue";
    pub const BRANCH_FALSE: &str = "branchFalse";
    pub const LOOP_BACK: &str = "loopBack";
    pub const CALLS_PROCEDURE: &str = "callsProcedure";
    pub const RUN_OF: &str = "runOf";
    pub const HAS_EXEMPLAR: &str = "hasExemplar";
    pub const GENERALIZED_BY: &str = "generalizedBy";
    pub const HAS_PATTERN: &str = "hasPattern";
    pub const USES_CREDENTIAL: &str = "usesCredential";
    pub const ASSOCIATED_WITH: &str = "associatedWith";
    pub const CONTAINS: &str = "contains";
    pub const REFERENCES: &str = "references";
    pub const DEFINES_PROP: &str = "definesProp";
    pub const HAS_OUTGOING: &str = "hasOutgoing";
    pub const POINTS_TO: &str = "pointsTo";
    pub const CONFORMS_TO: &str = "conformsTo";
    pub const NEXT_VERSION: &str = "nextVersion";
    pub const CORRECTION_OF: &str = "correctionOf";
}

/// `PropertyDef` value types (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Date,
    Url,
    Json,
    NodeRef,
}

/// `PropertyDef` cardinality (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "0..1")]
    ZeroOrOne,
    #[serde(rename = "0..n")]
    ZeroOrMany,
    #[serde(rename = "1..1")]
    ExactlyOne,
    #[serde(rename = "1..n")]
    OneOrMany,
}

/// Declares a predicate a prototype allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub value_type: ValueType,
    pub cardinality: Cardinality,
    pub allowed_target_prototypes: Vec<String>,
    /// Default value applied during hydration when the instance doesn't
    /// set this key itself (spec §4.2 hydration algorithm).
    #[serde(default)]
    pub default: Option<Value>,
}

impl PropertyDef {
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            value_type,
            cardinality,
            allowed_target_prototypes: Vec::new(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

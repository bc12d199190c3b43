//! Static step definitions referenced by execution records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Step type name that routes a plain step to the identity leaf handler.
pub const IDENTITY_STEP: &str = "IDENTITY_STEP";
/// Step type name that routes a strategy level to the identity strategy handler.
pub const IDENTITY_STRATEGY: &str = "IDENTITY_STRATEGY";
/// Step type name for a child whose parent level is a strategy.
pub const IDENTITY_STRATEGY_INTERNAL: &str = "IDENTITY_STRATEGY_INTERNAL";

/// Broad category of a step type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCategory {
    /// The pipeline itself.
    Pipeline,
    /// The container holding all stages.
    Stages,
    /// A single stage.
    Stage,
    /// A group of steps.
    StepGroup,
    /// A single step.
    Step,
    /// A parallel fork.
    Fork,
    /// A matrix / for-each repeat group.
    Strategy,
}

/// How the graph visualisation treats a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipType {
    /// A pure grouping construct with nothing worth surfacing.
    Noop,
    /// Rendered normally.
    DoNotSkip,
}

impl StepCategory {
    /// Skip classification for vertices of this category.
    #[must_use]
    pub fn skip_type(&self) -> SkipType {
        match self {
            Self::Stages | Self::Fork | Self::Strategy => SkipType::Noop,
            Self::Pipeline | Self::Stage | Self::StepGroup | Self::Step => SkipType::DoNotSkip,
        }
    }
}

/// A step type: the dispatch name plus its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepType {
    /// Dispatch name (e.g. `ShellScript`, `IDENTITY_STEP`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Category.
    pub category: StepCategory,
}

impl StepType {
    /// Creates a new step type.
    #[must_use]
    pub fn new(type_name: impl Into<String>, category: StepCategory) -> Self {
        Self {
            type_name: type_name.into(),
            category,
        }
    }

    /// Returns true if this is one of the identity dispatch types.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            IDENTITY_STEP | IDENTITY_STRATEGY | IDENTITY_STRATEGY_INTERNAL
        )
    }

    /// Returns true if this step type is a strategy.
    #[must_use]
    pub fn is_strategy(&self) -> bool {
        self.category == StepCategory::Strategy
    }

    /// Returns the identity type replaying a step of this type.
    ///
    /// Strategy levels become `IDENTITY_STRATEGY`; levels directly below a
    /// strategy become `IDENTITY_STRATEGY_INTERNAL`; everything else becomes
    /// `IDENTITY_STEP`. The category is preserved.
    #[must_use]
    pub fn identity_counterpart(&self, parent_is_strategy: bool) -> Self {
        let type_name = if self.is_strategy() {
            IDENTITY_STRATEGY
        } else if parent_is_strategy {
            IDENTITY_STRATEGY_INTERNAL
        } else {
            IDENTITY_STEP
        };
        Self::new(type_name, self.category)
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)
    }
}

/// Fields shared by every plan node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique plan node id.
    pub uuid: String,
    /// User-facing identifier.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Step type the engine dispatches on.
    pub step_type: StepType,
}

/// A static step definition.
///
/// Identity nodes are synthesised at retry time and mark "replay, don't
/// re-run" for a prior execution. They are persisted once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNode {
    /// A step authored in the pipeline.
    Standard(NodeDefinition),
    /// A clone replaying `original_execution_id`.
    Identity {
        /// Definition of the identity node (its step type is an identity type).
        #[serde(flatten)]
        definition: NodeDefinition,
        /// The execution this node replays.
        original_execution_id: String,
        /// Step type of the node being replayed.
        original_step_type: StepType,
    },
}

impl PlanNode {
    /// Creates a standard plan node.
    #[must_use]
    pub fn standard(
        uuid: impl Into<String>,
        identifier: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        let identifier = identifier.into();
        Self::Standard(NodeDefinition {
            uuid: uuid.into(),
            name: identifier.clone(),
            identifier,
            step_type,
        })
    }

    /// Synthesises an identity node replaying the given execution of `original`.
    #[must_use]
    pub fn identity_for(
        original: &Self,
        original_execution_id: impl Into<String>,
        parent_is_strategy: bool,
    ) -> Self {
        let source = original.definition();
        let original_step_type = original.original_step_type().clone();
        Self::Identity {
            definition: NodeDefinition {
                uuid: crate::utils::generate_uuid().to_string(),
                identifier: source.identifier.clone(),
                name: source.name.clone(),
                step_type: original_step_type.identity_counterpart(parent_is_strategy),
            },
            original_execution_id: original_execution_id.into(),
            original_step_type,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Standard(def) | Self::Identity { definition: def, .. } => {
                def.name = name.into();
            }
        }
        self
    }

    /// Returns the shared definition.
    #[must_use]
    pub fn definition(&self) -> &NodeDefinition {
        match self {
            Self::Standard(def) | Self::Identity { definition: def, .. } => def,
        }
    }

    /// Returns the plan node id.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.definition().uuid
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition().name
    }

    /// Returns the step type the engine dispatches on.
    #[must_use]
    pub fn step_type(&self) -> &StepType {
        &self.definition().step_type
    }

    /// Returns the step type of the authored step, looking through identity nodes.
    #[must_use]
    pub fn original_step_type(&self) -> &StepType {
        match self {
            Self::Standard(def) => &def.step_type,
            Self::Identity {
                original_step_type, ..
            } => original_step_type,
        }
    }

    /// Returns the replayed execution id for identity nodes.
    #[must_use]
    pub fn original_execution_id(&self) -> Option<&str> {
        match self {
            Self::Standard(_) => None,
            Self::Identity {
                original_execution_id,
                ..
            } => Some(original_execution_id),
        }
    }

    /// Returns true for identity nodes.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity { .. })
    }

    /// Skip classification, derived statically from the authored step type.
    #[must_use]
    pub fn skip_type(&self) -> SkipType {
        self.original_step_type().category.skip_type()
    }
}

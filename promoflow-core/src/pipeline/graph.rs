//! Directed stage graph: nodes are stages, edges are the artifacts one stage
//! hands to another.

use crate::artifact::ArtifactLedger;
use crate::error::PipelineError;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Ingestion,
    Validation,
    Transformation,
    Training,
    Evaluation,
    Pushing,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        StageKind::Ingestion,
        StageKind::Validation,
        StageKind::Transformation,
        StageKind::Training,
        StageKind::Evaluation,
        StageKind::Pushing,
    ];

    /// The artifact this stage produces.
    pub fn produces(self) -> ArtifactKind {
        match self {
            StageKind::Ingestion => ArtifactKind::Ingestion,
            StageKind::Validation => ArtifactKind::Validation,
            StageKind::Transformation => ArtifactKind::Transformation,
            StageKind::Training => ArtifactKind::Trainer,
            StageKind::Evaluation => ArtifactKind::Evaluation,
            StageKind::Pushing => ArtifactKind::Pusher,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Ingestion => write!(f, "ingestion"),
            StageKind::Validation => write!(f, "validation"),
            StageKind::Transformation => write!(f, "transformation"),
            StageKind::Training => write!(f, "training"),
            StageKind::Evaluation => write!(f, "evaluation"),
            StageKind::Pushing => write!(f, "pushing"),
        }
    }
}

/// Artifact types carried along graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Ingestion,
    Validation,
    Transformation,
    Trainer,
    Evaluation,
    Pusher,
}

impl ArtifactKind {
    /// Whether the ledger already holds an artifact of this kind.
    pub fn is_present(self, ledger: &ArtifactLedger) -> bool {
        match self {
            ArtifactKind::Ingestion => ledger.ingestion.is_some(),
            ArtifactKind::Validation => ledger.validation.is_some(),
            ArtifactKind::Transformation => ledger.transformation.is_some(),
            ArtifactKind::Trainer => ledger.trainer.is_some(),
            ArtifactKind::Evaluation => ledger.evaluation.is_some(),
            ArtifactKind::Pusher => ledger.pusher.is_some(),
        }
    }
}

pub struct StageGraph {
    graph: DiGraph<StageKind, ArtifactKind>,
    index: HashMap<StageKind, NodeIndex>,
}

impl StageGraph {
    /// The promotion pipeline: every artifact edge between its six stages.
    pub fn standard() -> Self {
        let mut graph = DiGraph::new();
        let index: HashMap<StageKind, NodeIndex> = StageKind::ALL
            .iter()
            .map(|stage| (*stage, graph.add_node(*stage)))
            .collect();
        let edges = [
            (StageKind::Ingestion, StageKind::Validation),
            (StageKind::Ingestion, StageKind::Transformation),
            (StageKind::Validation, StageKind::Transformation),
            (StageKind::Transformation, StageKind::Training),
            (StageKind::Training, StageKind::Evaluation),
            (StageKind::Ingestion, StageKind::Evaluation),
            (StageKind::Evaluation, StageKind::Pushing),
            (StageKind::Training, StageKind::Pushing),
        ];
        for (from, to) in edges {
            graph.add_edge(index[&from], index[&to], from.produces());
        }
        Self { graph, index }
    }

    /// Stages in dependency order.
    pub fn execution_order(&self) -> Result<Vec<StageKind>, PipelineError> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            PipelineError::config(format!(
                "stage graph has a cycle through {}",
                self.graph[cycle.node_id()]
            ))
        })?;
        Ok(order.into_iter().map(|idx| self.graph[idx]).collect())
    }

    /// Upstream stages of `stage` and the artifact each one hands over.
    pub fn inputs_of(&self, stage: StageKind) -> Vec<(StageKind, ArtifactKind)> {
        let Some(&idx) = self.index.get(&stage) else {
            return Vec::new();
        };
        let mut inputs: Vec<(StageKind, ArtifactKind)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| (self.graph[edge.source()], *edge.weight()))
            .collect();
        inputs.sort_by_key(|(from, _)| *from);
        inputs
    }

    /// Fail unless every input artifact of `stage` is in the ledger.
    pub fn check_inputs(&self, stage: StageKind, ledger: &ArtifactLedger) -> Result<(), PipelineError> {
        let missing: Vec<String> = self
            .inputs_of(stage)
            .into_iter()
            .filter(|(_, artifact)| !artifact.is_present(ledger))
            .map(|(from, _)| from.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::not_found(format!(
                "{stage} stage is missing artifacts from: {}",
                missing.join(", ")
            )))
        }
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_order_is_linear() {
        let graph = StageGraph::standard();
        assert_eq!(graph.execution_order().unwrap(), StageKind::ALL.to_vec());
    }

    #[test]
    fn test_inputs_of_evaluation() {
        let graph = StageGraph::standard();
        assert_eq!(
            graph.inputs_of(StageKind::Evaluation),
            vec![
                (StageKind::Ingestion, ArtifactKind::Ingestion),
                (StageKind::Training, ArtifactKind::Trainer),
            ]
        );
        assert!(graph.inputs_of(StageKind::Ingestion).is_empty());
    }

    #[test]
    fn test_check_inputs_names_missing_stage() {
        let graph = StageGraph::standard();
        let ledger = ArtifactLedger::default();
        assert!(graph.check_inputs(StageKind::Ingestion, &ledger).is_ok());
        let err = graph.check_inputs(StageKind::Validation, &ledger).unwrap_err();
        assert!(err.to_string().contains("ingestion"));
    }

    #[test]
    fn test_display() {
        assert_eq!(StageKind::Training.to_string(), "training");
        assert_eq!(StageKind::Pushing.to_string(), "pushing");
    }
}

//! Message types defined by the platform for the calculate solution extension point.
//!
//! These are views: they decode the fields extensions read and ignore everything else.
//! Replies that must carry a message unchanged use [`Body`](crate::Body).

use serde::Deserialize;

/// A proposed placement of workloads onto hubs, sent during the calculate solution phase.
///
/// Extensions may reply with the proposal unchanged to accept it, or with a modified proposal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename = "PlacementProposal", rename_all = "camelCase")]
pub struct SolutionProposal {
    /// Link to the workflow that requested the placement. An attribute in XML.
    #[serde(default, alias = "@href")]
    pub href: Option<String>,
    /// The solution the platform proposes.
    pub proposed_solution: ProposedSolution,
}

impl SolutionProposal {
    /// The hub of the first subject/hub assignment, if there is one.
    pub fn proposed_hub(&self) -> Option<&str> {
        self.proposed_solution
            .subject_hub_assignment
            .first()
            .map(|assignment| assignment.hub_uri.as_str())
    }
}

/// The assignments making up a proposed solution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedSolution {
    /// One assignment per placed subject.
    #[serde(default)]
    pub subject_hub_assignment: Vec<SubjectHubAssignment>,
}

/// Places one subject (e.g. a VM) on one hub (e.g. a host or resource pool).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectHubAssignment {
    /// The placed subject.
    pub subject_uri: String,
    /// Where the subject is placed.
    pub hub_uri: String,
}

/// Sent by the platform to an extension when something went wrong on the platform side,
/// e.g. a previous reply could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename = "ExtensionErrorMessage")]
pub struct ExtensionErrorMessage {
    /// Human readable description of the error.
    pub message: String,
}

impl ExtensionErrorMessage {
    /// The AMQP `type` property of deliveries carrying an error message.
    pub const MESSAGE_TYPE: &'static str = "ExtensionErrorMessage";
}

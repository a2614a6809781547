use serde::{Deserialize, Serialize};

/// The two closed workflows a [`Phase`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Core,
    Hooks,
}

/// A named stage in one of the two fixed, ordered phase sequences.
///
/// A task's phase contributes an implicit ordering constraint: every
/// task in an earlier phase of a workflow must complete before any task
/// in a later phase of the *same* workflow. Phases in different
/// workflows are incomparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    // Core workflow, in order.
    Init,
    Lint,
    Verify,
    Build,
    Test,
    Run,
    Release,
    Publish,
    // Hooks workflow, in order.
    PreCommit,
    PrepareCommitMsg,
    CommitMsg,
    PostCommit,
    PrePush,
}

const CORE_ORDER: [Phase; 8] = [
    Phase::Init,
    Phase::Lint,
    Phase::Verify,
    Phase::Build,
    Phase::Test,
    Phase::Run,
    Phase::Release,
    Phase::Publish,
];

const HOOKS_ORDER: [Phase; 5] = [
    Phase::PreCommit,
    Phase::PrepareCommitMsg,
    Phase::CommitMsg,
    Phase::PostCommit,
    Phase::PrePush,
];

impl Phase {
    pub fn workflow(self) -> Workflow {
        match self {
            Phase::Init
            | Phase::Lint
            | Phase::Verify
            | Phase::Build
            | Phase::Test
            | Phase::Run
            | Phase::Release
            | Phase::Publish => Workflow::Core,
            Phase::PreCommit
            | Phase::PrepareCommitMsg
            | Phase::CommitMsg
            | Phase::PostCommit
            | Phase::PrePush => Workflow::Hooks,
        }
    }

    /// Position within this phase's workflow; lower runs earlier.
    fn ordinal(self) -> usize {
        match self.workflow() {
            Workflow::Core => CORE_ORDER.iter().position(|p| *p == self).unwrap(),
            Workflow::Hooks => HOOKS_ORDER.iter().position(|p| *p == self).unwrap(),
        }
    }

    /// Whether `self` must complete before `other` purely by virtue of
    /// phase ordering. Always `false` across workflows.
    pub fn precedes(self, other: Phase) -> bool {
        self.workflow() == other.workflow() && self.ordinal() < other.ordinal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Lint => "LINT",
            Phase::Verify => "VERIFY",
            Phase::Build => "BUILD",
            Phase::Test => "TEST",
            Phase::Run => "RUN",
            Phase::Release => "RELEASE",
            Phase::Publish => "PUBLISH",
            Phase::PreCommit => "PRE_COMMIT",
            Phase::PrepareCommitMsg => "PREPARE_COMMIT_MSG",
            Phase::CommitMsg => "COMMIT_MSG",
            Phase::PostCommit => "POST_COMMIT",
            Phase::PrePush => "PRE_PUSH",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`Phase::from_str`] / `Phase`'s `FromStr` impl when a
/// name doesn't match one of the closed phase set.
#[derive(Debug, Clone)]
pub struct UnknownPhase(pub String);

impl std::fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown phase '{}'", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl std::str::FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Phase::Init),
            "LINT" => Ok(Phase::Lint),
            "VERIFY" => Ok(Phase::Verify),
            "BUILD" => Ok(Phase::Build),
            "TEST" => Ok(Phase::Test),
            "RUN" => Ok(Phase::Run),
            "RELEASE" => Ok(Phase::Release),
            "PUBLISH" => Ok(Phase::Publish),
            "PRE_COMMIT" => Ok(Phase::PreCommit),
            "PREPARE_COMMIT_MSG" => Ok(Phase::PrepareCommitMsg),
            "COMMIT_MSG" => Ok(Phase::CommitMsg),
            "POST_COMMIT" => Ok(Phase::PostCommit),
            "PRE_PUSH" => Ok(Phase::PrePush),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

//! Pipeline step identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Steps the pipeline knows how to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// go build -trimpath -o build/app .
    Build,

    /// go test -v ./...
    Test,

    /// golangci-lint run
    Lint,

    /// ./build/app, exposed as a long-running service
    Service,
}

impl Step {
    /// Steps run by the full CI pipeline, in declaration order.
    pub const PIPELINE: [Step; 3] = [Step::Build, Step::Test, Step::Lint];

    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Build => "build",
            Step::Test => "test",
            Step::Lint => "lint",
            Step::Service => "service",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

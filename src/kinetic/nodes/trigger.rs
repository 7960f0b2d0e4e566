// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::ndk::error::EngineError;
use crate::ndk::executor::{NodeExecutor, RunContext};
use crate::ndk::result::NodeResult;
use crate::ndk::value::into_output;

/// Entry node: hands the run input to its successors unchanged
pub struct TriggerExecutor;

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    fn node_type(&self) -> &str {
        "trigger"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        Ok(NodeResult::success(into_output(ctx.input.clone())))
    }
}

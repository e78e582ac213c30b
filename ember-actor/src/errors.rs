/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ActorError>;

#[derive(Error, Debug)]
pub enum ActorError {
    #[error("actor not found: {0}")]
    ActorNotFound(String),

    #[error("actor already stopped: {0}")]
    ActorStopped(String),

    #[error("mailbox full for actor {0}")]
    MailboxFull(String),

    #[error("receiver closed for actor {0}")]
    ReceiverClosed(String),

    #[error("a CallWait from {0} targeting itself would deadlock")]
    SelfCallDeadlock(String),

    #[error("call to {0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("reply sink consumed or abandoned for {0}")]
    ReplyAbandoned(String),

    #[error("route parse error: {0}")]
    RouteParse(#[from] ember_proto::errors::ProtoError),

    #[error("argument decode error: {0}")]
    Decode(String),

    #[error("unknown function '{0}' on actor {1}")]
    UnknownFunction(String, String),

    #[error("failed to join actor task: {0}")]
    Join(String),

    #[error("operation failed: {0}")]
    OpFailed(String),
}

pub fn op_failed(msg: impl ToString) -> ActorError {
    ActorError::OpFailed(msg.to_string())
}

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

//! Sessions, the connector accept loop and state machine, and the handler
//! component that bridges inbound client messages to `ember-actor`. Two
//! transports (`connector::Connector::accept_tcp`, `ws::router`) feed the
//! same packet/message codec and the same per-session state machine.

pub mod connector;
pub mod errors;
pub mod handler;
pub mod handshake;
pub mod session;
pub mod ws;

pub mod prelude {
    pub use crate::connector::{Connector, ConnectorConfig, RemoteForwarder};
    pub use crate::errors::{NetError, NetResult};
    pub use crate::handler::HandlerComponent;
    pub use crate::session::{Session, SessionRegistry, SessionStatus};
}

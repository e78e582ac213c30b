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

//! `nodeId/actorType/actorId[/childId]` addressing.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorPath {
    pub node_id: String,
    pub actor_type: String,
    pub actor_id: String,
    pub child_id: Option<String>,
}

impl ActorPath {
    pub fn new(node_id: impl Into<String>, actor_type: impl Into<String>, actor_id: impl Into<String>) -> Self {
        ActorPath { node_id: node_id.into(), actor_type: actor_type.into(), actor_id: actor_id.into(), child_id: None }
    }

    pub fn child(&self, child_id: impl Into<String>) -> Self {
        ActorPath { child_id: Some(child_id.into()), ..self.clone() }
    }

    pub fn parent(&self) -> Option<ActorPath> {
        if self.child_id.is_some() {
            Some(ActorPath { child_id: None, ..self.clone() })
        } else {
            None
        }
    }

    /// A path names an actor in this process iff its `node_id` matches.
    pub fn is_local_to(&self, own_node_id: &str) -> bool {
        self.node_id == own_node_id
    }

    pub fn parse(s: &str) -> Option<ActorPath> {
        let mut parts = s.split('/');
        let node_id = parts.next()?.to_string();
        let actor_type = parts.next()?.to_string();
        let actor_id = parts.next()?.to_string();
        if node_id.is_empty() || actor_type.is_empty() || actor_id.is_empty() {
            return None;
        }
        let child_id = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return None;
        }
        Some(ActorPath { node_id, actor_type, actor_id, child_id })
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.node_id, self.actor_type, self.actor_id)?;
        if let Some(c) = &self.child_id {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}

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

use std::path::PathBuf;

use clap::Parser;

/// `ember --config path/to/cluster.ron --node-id game-1`
#[derive(Parser, Debug)]
#[command(name = "ember", version, about = "A node in an ember cluster")]
pub struct Cli {
    /// Path to the cluster's RON configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Which node in the config this process boots as.
    #[arg(long = "node-id", value_name = "ID")]
    pub node_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_two_required_flags() {
        let cli = Cli::parse_from(["ember", "--config", "cluster.ron", "--node-id", "game-1"]);
        assert_eq!(cli.config, PathBuf::from("cluster.ron"));
        assert_eq!(cli.node_id, "game-1");
    }
}

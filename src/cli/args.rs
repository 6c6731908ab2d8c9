use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "Chunkvault", version = "0.1.0")]
/// Distributed artifact store: one catalog, a pool of in-process storage nodes.
pub struct Arguments {
    #[arg(short, long)]
    /// Cluster configuration file. In YAML format.
    pub config: Option<String>,

    #[arg(short, long)]
    /// Number of storage nodes to spawn. Overrides the config file.
    pub nodes: Option<usize>,

    #[arg(long)]
    /// Chunk size in bytes. Overrides the config file.
    pub chunk_size: Option<usize>,

    #[arg(short, long)]
    /// Target replica count per chunk. Overrides the config file.
    pub replication_factor: Option<usize>,

    #[arg(short, long)]
    /// Log the ongoing catalog and node activity. (For debugging purposes).
    pub verbose: bool,

    #[arg(long)]
    /// Print the final cluster status as JSON.
    pub json: bool,
}

/*

    -c --config: Cluster configuration file. In YAML format.
        Contains:
            - node_count, chunk_size, replication_factor
            - heartbeat_interval_ms, replication_check_interval_ms, request_timeout_ms
            - shutdown_grace_ms (optional), log_level
    -n --nodes: Number of storage nodes to spawn.
    --chunk-size: Chunk size in bytes.
    -r --replication-factor: Target replica count per chunk.
    -v --verbose: Log at debug level, regardless of the config file.
    --json: Print the final cluster status as JSON.
    -h --help: Print help message
 */

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_argument_parsing_without_arguments() {
        let args = Arguments::parse_from(["test"]);
        assert!(args.config.is_none());
        assert!(args.nodes.is_none());
        assert!(!args.verbose);
        assert!(!args.json);
    }

    #[test]
    fn test_argument_parsing_with_config() {
        let args = Arguments::parse_from(["test", "--config", "cluster.yaml"]);
        assert_eq!(args.config.as_deref(), Some("cluster.yaml"));
    }

    #[test]
    fn test_argument_parsing_with_overrides() {
        let args = Arguments::parse_from([
            "test",
            "-n",
            "5",
            "--chunk-size",
            "64",
            "--replication-factor",
            "3",
        ]);
        assert_eq!(args.nodes, Some(5));
        assert_eq!(args.chunk_size, Some(64));
        assert_eq!(args.replication_factor, Some(3));
    }

    #[test]
    fn test_argument_parsing_with_verbose_and_json() {
        let args = Arguments::parse_from(["test", "--verbose", "--json"]);
        assert!(args.verbose);
        assert!(args.json);
    }

    #[test]
    fn test_argument_parsing_invalid_number() {
        let result = Arguments::try_parse_from(["test", "--nodes", "many"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_argument_parsing_unknown_argument() {
        let result = Arguments::try_parse_from(["test", "--unknown"]);
        assert!(result.is_err());
    }
}

use std::path::PathBuf;

/// Boot-time flags. `--replicaof` switches the process into replica mode;
/// `--dir`/`--dbfilename` only matter for masters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub replica_of: Option<(String, u16)>,
    pub dir: Option<String>,
    pub dbfilename: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6379,
            replica_of: None,
            dir: None,
            dbfilename: None,
        }
    }
}

impl ServerConfig {
    /// Parse the CLI flags (program name already stripped).
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<ServerConfig, String> {
        let mut config = ServerConfig::default();
        let mut iter = args.into_iter();
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "--port" => {
                    let raw = iter
                        .next()
                        .ok_or("Argument Error: --port option requires an argument")?;
                    config.port = raw
                        .parse()
                        .map_err(|_| format!("Argument Error: invalid port '{raw}'"))?;
                }
                "--dir" => {
                    config.dir = Some(
                        iter.next()
                            .ok_or("Argument Error: --dir option requires an argument")?,
                    );
                }
                "--dbfilename" => {
                    config.dbfilename = Some(
                        iter.next()
                            .ok_or("Argument Error: --dbfilename option requires an argument")?,
                    );
                }
                "--replicaof" => {
                    let raw = iter
                        .next()
                        .ok_or("Argument Error: --replicaof requires a host and port (e.g., 'localhost 6379')")?;
                    let parts: Vec<&str> = raw.split_whitespace().collect();
                    let [host, port] = parts.as_slice() else {
                        return Err(
                            "Argument Error: --replicaof requires a host and port (e.g., 'localhost 6379')"
                                .into(),
                        );
                    };
                    let port = port
                        .parse()
                        .map_err(|_| format!("Argument Error: invalid master port '{port}'"))?;
                    config.replica_of = Some((host.to_string(), port));
                }
                other => return Err(format!("Argument Error: '{other}' is an unknown option")),
            }
        }
        Ok(config)
    }

    pub fn is_replica(&self) -> bool {
        self.replica_of.is_some()
    }

    /// Snapshot location, masters only: both flags must name it.
    pub fn rdb_path(&self) -> Option<PathBuf> {
        if self.is_replica() {
            return None;
        }
        match (&self.dir, &self.dbfilename) {
            (Some(dir), Some(file)) => Some(PathBuf::from(dir).join(file)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, String> {
        ServerConfig::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_without_flags() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.port, 6379);
        assert!(!config.is_replica());
        assert!(config.rdb_path().is_none());
    }

    #[test]
    fn parses_master_flags() {
        let config = parse(&["--port", "7001", "--dir", "/tmp/rdb", "--dbfilename", "dump.rdb"])
            .unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(
            config.rdb_path(),
            Some(PathBuf::from("/tmp/rdb").join("dump.rdb"))
        );
    }

    #[test]
    fn replicaof_switches_role_and_ignores_rdb() {
        let config = parse(&[
            "--replicaof",
            "localhost 6379",
            "--dir",
            "/tmp",
            "--dbfilename",
            "dump.rdb",
        ])
        .unwrap();
        assert!(config.is_replica());
        assert_eq!(config.replica_of, Some(("localhost".to_string(), 6379)));
        assert!(config.rdb_path().is_none());
    }

    #[test]
    fn rejects_bad_flags() {
        assert!(parse(&["--port"]).is_err());
        assert!(parse(&["--port", "not-a-port"]).is_err());
        assert!(parse(&["--replicaof", "localhost"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
    }
}

use crate::app_config::ReplicaOverride;
use crate::sql_utils::SQLtuple;
use crate::wiki_site;
use anyhow::{anyhow, Result};
use config::{Config, File, FileFormat};
use mysql_async as my;
use mysql_async::prelude::{FromRow, Queryable};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{instrument, trace};

const REPLICA_CNF: &str = "replica.my.cnf";
const DEFAULT_PORT: u16 = 3306;

// ---------------------------------------------------------------------------
// Credential source – replica.my.cnf or config fallback
// ---------------------------------------------------------------------------

/// A resolved user/password pair, obtained from either `~/replica.my.cnf`
/// or the `replica` section of the app config.
#[derive(Debug, Clone)]
struct Credentials {
    user: String,
    password: String,
}

/// Values in `replica.my.cnf` are single-quoted.
fn unquote(s: &str) -> String {
    s.trim().trim_matches('\'').trim_matches('"').to_string()
}

// ---------------------------------------------------------------------------
// DatabaseManager – wiki replica connections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DatabaseManager {
    replica: ReplicaOverride,
    query_timeout: Duration,
}

impl DatabaseManager {
    pub fn new(replica: &ReplicaOverride, query_timeout: Duration) -> Self {
        Self {
            replica: replica.to_owned(),
            query_timeout,
        }
    }

    fn credentials_file(&self) -> Option<PathBuf> {
        self.replica
            .credentials_file
            .clone()
            .or_else(|| std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(REPLICA_CNF)))
    }

    /// Resolve database credentials.
    ///
    /// Tries `~/replica.my.cnf` first (standard Toolforge setup). When that
    /// file is absent, e.g. during local development, falls back to the
    /// configured `replica.user` / `replica.password`.
    fn credentials(&self) -> Result<Credentials> {
        if let Some(path) = self.credentials_file().filter(|p| p.exists()) {
            let cnf = Config::builder()
                .add_source(File::from(path.clone()).format(FileFormat::Ini))
                .build()
                .map_err(|e| anyhow!("Cannot parse {}: {e}", path.display()))?;
            if let (Ok(user), Ok(password)) =
                (cnf.get_string("client.user"), cnf.get_string("client.password"))
            {
                return Ok(Credentials {
                    user: unquote(&user),
                    password: unquote(&password),
                });
            }
        }

        let user = self.replica.user.clone().ok_or_else(|| {
            anyhow!(
                "No ~/replica.my.cnf found and no 'replica.user' in config – \
                 cannot resolve database credentials"
            )
        })?;
        let password = self.replica.password.clone().unwrap_or_default();
        Ok(Credentials { user, password })
    }

    /// Returns the canonical Toolforge host and `_p`-suffixed database name
    /// for a wiki replica, as a `(host, schema)` tuple.
    pub fn db_host_and_schema_for_wiki(&self, wiki: &str) -> (String, String) {
        let wiki = wiki_site::db_name(wiki);
        let host = format!("{wiki}.web.db.svc.wikimedia.cloud");
        let schema = format!("{wiki}_p");
        (host, schema)
    }

    fn get_mysql_opts_for_wiki(&self, wiki: &str) -> Result<my::Opts> {
        let creds = self.credentials()?;
        let (host, schema) = self.db_host_and_schema_for_wiki(wiki);

        // Port: prefer an explicit port_mapping entry (local SSH tunnels),
        // then fall back to replica.port, then the default 3306.
        let port = self
            .replica
            .port_mapping
            .get(&wiki_site::db_name(wiki))
            .copied()
            .or(self.replica.port)
            .unwrap_or(DEFAULT_PORT);
        let effective_host = self.replica.host.clone().unwrap_or(host);

        Ok(my::OptsBuilder::default()
            .ip_or_hostname(effective_host)
            .db_name(Some(schema))
            .user(Some(creds.user))
            .pass(Some(creds.password))
            .tcp_port(port)
            .into())
    }

    #[instrument(skip(self), err)]
    pub async fn get_wiki_db_connection(&self, wiki: &str) -> Result<my::Conn> {
        let opts = self.get_mysql_opts_for_wiki(wiki)?;
        trace!(user = opts.user());
        my::Conn::new(opts)
            .await
            .map_err(|e| anyhow!("Cannot connect to replica for {wiki}: {e}"))
    }

    /// Runs one parameterised query against a wiki replica, bounded by the
    /// configured query timeout.
    pub async fn query_wiki<T>(&self, wiki: &str, sql: SQLtuple) -> Result<Vec<T>>
    where
        T: FromRow + Send + 'static,
    {
        let run = async {
            let mut conn = self.get_wiki_db_connection(wiki).await?;
            let rows = conn
                .exec_iter(sql.0.as_str(), my::Params::Positional(sql.1))
                .await
                .map_err(|e| anyhow!(e))?
                .map_and_drop(my::from_row::<T>)
                .await
                .map_err(|e| anyhow!(e))?;
            conn.disconnect().await.map_err(|e| anyhow!(e))?;
            Ok::<_, anyhow::Error>(rows)
        };
        tokio::time::timeout(self.query_timeout, run)
            .await
            .map_err(|_| anyhow!("Query on {wiki} timed out after {:?}", self.query_timeout))?
    }
}

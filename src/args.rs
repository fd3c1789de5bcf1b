use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether clients connect to the site over https.
    /// If so, the sessionid cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address to listen on. By default only the
    /// IPv4 loopback is used.
    #[arg(short, long)]
    address: Option<String>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Directory holding the sqlite database.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Memory cost (KiB) for newly hashed passwords.
    #[arg(long, default_value_t = 19 * 1024)]
    hash_memory: u32,

    /// Iteration count for newly hashed passwords.
    #[arg(long, default_value_t = 2)]
    hash_iterations: u32,

    /// Days a logged in session may sit idle before it expires.
    #[arg(long, default_value_t = 14)]
    session_days: u32,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn hash_cost(&self) -> (u32, u32) {
        (self.hash_memory, self.hash_iterations)
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(u64::from(self.session_days) * 24 * 60 * 60)
    }
}

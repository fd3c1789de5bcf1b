use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod args;
use args::Args;

mod auth;
mod backend;
mod feedback;
mod forms;
mod password;
mod routes;
mod session;
mod site;
mod time;
mod user;
mod views;

#[cfg(test)]
mod mock;

use backend::SqlBackend;
use password::Hasher;
use routes::App;
use session::Sessions;
use site::Site;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();

    let args = Args::parse();

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (memory, iterations) = args.hash_cost();
    let hasher = match Hasher::new(memory, iterations) {
        Ok(hasher) => hasher,
        Err(e) => {
            error!("invalid password hash cost: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Ok(backend) = SqlBackend::open(args.data_dir()).await else {
        return ExitCode::FAILURE;
    };

    let sessions = Sessions::new(args.session_lifetime());
    let app = Arc::new(App::new(Site::new(backend, hasher), sessions, args.secure()));
    let routes = routes::routes(app);

    info!("listening on {addr}");
    warp::serve(routes).run(addr).await;

    ExitCode::SUCCESS
}

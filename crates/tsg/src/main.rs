use std::sync::Arc;

use tsg_core::{auth::AuthClient, config::Config};
use tsg_grammers::GrammersAuth;

#[tokio::main]
async fn main() -> Result<(), tsg_core::Error> {
    tsg_core::logging::init("tsg");

    let cfg = Arc::new(Config::load()?);
    let auth: Arc<dyn AuthClient> = Arc::new(GrammersAuth::new());

    tsg_telegram::router::run_polling(cfg, auth).await
}

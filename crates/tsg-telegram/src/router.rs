use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tsg_core::{
    audit::{AuditLog, OperatorAudit},
    auth::AuthClient,
    config::Config,
    messaging::MessagingPort,
    service::WizardService,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<WizardService>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(cfg: Arc<Config>, auth: Arc<dyn AuthClient>) -> tsg_core::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(bot = %me.username(), "started");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let audit = Arc::new(OperatorAudit::new(
        messenger.clone(),
        cfg.operator,
        AuditLog::new(cfg.audit_log_path.clone()),
    ));
    let service = Arc::new(WizardService::new(
        &cfg,
        auth,
        messenger.clone(),
        audit,
    ));

    // Idle wizards hold live connections; sweep them so the registry cannot
    // grow without bound.
    {
        let service = service.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            tick.tick().await; // the first tick fires immediately
            loop {
                tick.tick().await;
                service.expire_idle().await;
            }
        });
    }

    let state = Arc::new(AppState {
        cfg,
        service,
        messenger,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

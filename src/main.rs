use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use opendiary_attendance::mail::imap::ImapSource;
use opendiary_attendance::routes::{self, AppState, MailControl};
use opendiary_attendance::{
    io, poller, AttachmentClassifier, Config, Directory, MailIngestionService, ScheduleCalendar,
    Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;
    io::prepare_io(&[&config.submissions_dir]).await?;

    let store = Store::new(&config.data_file);
    let roster = store.load().await?;
    let directory = Directory::with_store(roster, ScheduleCalendar::new(config.term_epoch), store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller_task = None;
    let mail = match config.mail.clone() {
        Some(mail_config) => {
            log::info!("checking {} as {}", mail_config.host, mail_config.username);
            let service = MailIngestionService::new(
                Arc::new(ImapSource::new(mail_config)),
                directory.clone(),
                AttachmentClassifier::new(&config.submissions_dir),
            );
            let (handle, task) =
                poller::spawn_poller(service.clone(), config.poll_interval, shutdown_rx);
            poller_task = Some(task);
            Some(MailControl {
                service,
                poller: handle,
            })
        }
        None => {
            log::warn!("OPENDIARY_IMAP_USER / OPENDIARY_IMAP_PASSWORD not set, mail polling is off");
            None
        }
    };

    let app = routes::router(AppState {
        directory: directory.clone(),
        mail,
    });

    log::info!("Starting OpenDiary attendance server on http://{}", config.listen);
    axum::Server::bind(&config.listen)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("could not listen for ctrl-c: {}", err);
            }
        })
        .await
        .context("http server failed")?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = poller_task {
        let _ = task.await;
    }
    directory.save().await?;
    log::info!("diary saved, bye");
    Ok(())
}

use anyhow::{bail, Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use aman_dashboard::logging::{self, LogFormat};
use aman_dashboard::{
    series, AmanClient, Config, Credentials, Device, Job, JobQuery, NotificationPage, PollHandle,
    PollSnapshot, SessionEvent, User, WaterParameter, WaterParameterSample,
};

const JOB_PAGE: u32 = 10;
const NOTIFICATION_PAGE: u32 = 10;
const WATER_WINDOW: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LogFormat::from_env());

    let config = Config::from_env()?;
    info!(
        api_url = %config.api_url,
        session_db = %config.session_db.display(),
        timeout_secs = config.timeout_secs,
        "Dashboard monitor starting"
    );

    let client = AmanClient::new(config).context("failed to build API client")?;
    let user = authenticate(&client).await?;
    info!(username = %user.username, role = ?user.role, "Authenticated");

    let devices = client.poll_registered_devices();
    let notifications = client.poll_unread_notifications(0, NOTIFICATION_PAGE);
    let water = client.poll_water_parameters(WATER_WINDOW);
    let mut jobs: Option<(String, PollHandle<Vec<Job>>)> = None;

    let mut devices_rx = devices.subscribe();
    let mut notifications_rx = notifications.subscribe();
    let mut water_rx = water.subscribe();
    let mut jobs_rx: Option<watch::Receiver<PollSnapshot<Vec<Job>>>> = None;
    let mut events = client.session_handle().events();

    loop {
        tokio::select! {
            Ok(()) = devices_rx.changed() => {
                let snapshot = devices_rx.borrow_and_update().clone();
                if let Some(first) = report_devices(&snapshot) {
                    if jobs.as_ref().map(|(id, _)| id != &first.device_id).unwrap_or(true) {
                        info!(device_id = %first.device_id, "Watching job queue");
                        let handle = client.poll_device_jobs(&first.device_id, JobQuery::latest(JOB_PAGE));
                        jobs_rx = Some(handle.subscribe());
                        jobs = Some((first.device_id.clone(), handle));
                    }
                }
            }
            Ok(()) = notifications_rx.changed() => {
                report_notifications(&notifications_rx.borrow_and_update());
            }
            Ok(()) = water_rx.changed() => {
                report_water(&water_rx.borrow_and_update());
            }
            Ok(()) = jobs_changed(&mut jobs_rx) => {
                if let Some(rx) = jobs_rx.as_mut() {
                    report_jobs(&rx.borrow_and_update());
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Expired) => {
                    warn!("Session expired; re-authenticating");
                    if let Err(e) = authenticate(&client).await {
                        error!(error = %e, "Could not re-authenticate");
                        break;
                    }
                }
                Ok(other) => info!(event = ?other, "Session event"),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(missed = n, "Session events lagged"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn jobs_changed(
    rx: &mut Option<watch::Receiver<PollSnapshot<Vec<Job>>>>,
) -> Result<(), watch::error::RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

async fn authenticate(client: &AmanClient) -> Result<User> {
    if let Some(user) = client.session().restore_session().await {
        return Ok(user);
    }
    let config = client.config();
    let (Some(email), Some(password)) = (&config.login_email, &config.login_password) else {
        bail!("no valid stored session; set AMAN_EMAIL and AMAN_PASSWORD to log in");
    };
    let user = client
        .session()
        .login(&Credentials::new(email.as_str(), password.as_str()))
        .await
        .context("login failed")?;
    Ok(user)
}

fn report_devices(snapshot: &PollSnapshot<Vec<Device>>) -> Option<Device> {
    if let Some(err) = &snapshot.last_error {
        warn!(seq = snapshot.seq, error = %err, "Device refresh failed");
    }
    let devices = snapshot.value.as_ref()?;
    for device in devices {
        info!(
            device_id = %device.device_id,
            hostname = %device.hostname,
            status = ?device.status,
            "Registered device"
        );
    }
    devices.first().cloned()
}

fn report_notifications(snapshot: &PollSnapshot<NotificationPage>) {
    let Some(page) = &snapshot.value else {
        return;
    };
    if page.total_count > 0 {
        info!(unread = page.total_count, "Unread notifications");
    }
    for notification in page.notifications.iter().filter(|n| !n.seen) {
        info!(
            id = notification.id,
            message = %notification.message,
            details = notification.details.as_deref().unwrap_or(""),
            "Notification"
        );
    }
}

fn report_water(snapshot: &PollSnapshot<Vec<WaterParameterSample>>) {
    let Some(samples) = &snapshot.value else {
        return;
    };
    let Some(latest) = samples.last() else {
        return;
    };
    for parameter in WaterParameter::ALL {
        let points = series(samples, parameter);
        let (min, max) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
        info!(
            device_id = %latest.device_id,
            parameter = parameter.field_name(),
            unit = parameter.unit(),
            latest = latest.value(parameter),
            min,
            max,
            samples = points.len(),
            "Water parameter"
        );
    }
}

fn report_jobs(snapshot: &PollSnapshot<Vec<Job>>) {
    let Some(jobs) = &snapshot.value else {
        return;
    };
    let pending = jobs.iter().filter(|j| !j.is_completed()).count();
    info!(total = jobs.len(), pending, "Job queue");
}

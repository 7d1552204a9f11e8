use layz_spa::{Session, ACCESSORY_INFO};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> layz_spa::Result<()> {
    tracing_subscriber::fmt::init();

    let username = env::var("LAYZ_USERNAME").expect("LAYZ_USERNAME not set");
    let password = env::var("LAYZ_PASSWORD").expect("LAYZ_PASSWORD not set");
    let args: Vec<String> = env::args().collect();
    let interval = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(layz_spa::DEFAULT_POLL_INTERVAL);

    let mut session = Session::builder().build()?;
    if !session
        .authenticate_with_backoff(&username, &password, 5, Duration::from_secs(2))
        .await
    {
        eprintln!("Login failed");
        return Err(layz_spa::Error::NotAuthenticated);
    }

    let ids = session.list_bound_devices().await;
    if ids.is_empty() {
        println!("No devices bound to this account");
        return Ok(());
    }

    let mut controllers = Vec::new();
    for did in ids {
        println!("{} {} [{did}]", ACCESSORY_INFO.manufacturer, ACCESSORY_INFO.model);
        let spa = session
            .controller(did)?
            .poll_interval(interval)
            .on_event(|event| {
                println!("{event:?}");
            })
            .on_snapshot(|state| {
                println!(
                    "{} | {:.1}\u{00b0}C / {:.1}\u{00b0}F -> {} | heat: {} | filter: {} | waves: {}",
                    if state.power { "ON " } else { "OFF" },
                    state.current_temperature.celsius(),
                    state.current_temperature.fahrenheit(),
                    state.target_temperature,
                    state.heating_on,
                    state.filter_on,
                    state.waves_on,
                );
            })
            .build();
        spa.start_polling();
        controllers.push(spa);
    }

    println!("Polling {} device(s) every {interval:?}...", controllers.len());
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

//! WiFi setup firmware for ESP32.
//!
//! Requires the ESP32 Rust toolchain; it does not build for the host.
//!
//! Boot routine:
//! 1. Classify the wake cause (setup switch, 24 h timer, power-on).
//! 2. Decide between the setup portal, a bounded connect, or sleeping again.
//! 3. Run the session until the connection manager is disabled.
//! 4. Arm both wake sources and enter deep sleep.

use std::sync::Arc;
use std::time::Duration;

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        gpio::{PinDriver, Pull},
        prelude::Peripherals,
    },
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sys,
};
use log::{info, warn};

use wifi_setup_core::boot::{plan_boot, BootAction, WakeCause};
use wifi_setup_core::{ConnectionState, CredentialStore, WifiSetupConfig};
use wifi_setup_esp32::{
    events::subscribe_link_events, identity, nvs::NvsCredentialStore, portal::EspPortal,
    radio::EspRadio,
};
use wifi_setup_server::{ConnectionManager, ConnectionOutcome, LinkEventBridge};

/// Timer wake interval.
const SLEEP_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// RTC-capable pin wired to the setup switch for EXT0 wake (active low).
const WAKE_PIN: sys::gpio_num_t = 25;

fn main() -> anyhow::Result<()> {
    sys::link_patches();
    EspLogger::initialize_default();

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let cause = wake_cause();
    if cause == WakeCause::Switch {
        // Hand the wake pin back from the RTC domain.
        unsafe { sys::rtc_gpio_deinit(WAKE_PIN) };
    }

    let mut switch = PinDriver::input(peripherals.pins.gpio18)?;
    switch.set_pull(Pull::Up)?;
    let switch_closed = switch.is_low();

    let store = Arc::new(NvsCredentialStore::new(nvs.clone())?);
    let action = plan_boot(cause, store.has_credentials(), switch_closed);
    info!("Wake cause {:?}, switch closed: {}, action {:?}", cause, switch_closed, action);

    if action != BootAction::Sleep {
        let config = WifiSetupConfig::default();
        let radio = EspRadio::new(peripherals.modem, sysloop.clone(), Some(nvs))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        if let Err(e) = runtime.block_on(run_session(action, config, store, radio, &sysloop)) {
            warn!("Session ended with error: {:?}", e);
        }
    }

    enter_deep_sleep()
}

async fn run_session(
    action: BootAction,
    config: WifiSetupConfig,
    store: Arc<NvsCredentialStore>,
    radio: EspRadio,
    sysloop: &EspSystemEventLoop,
) -> anyhow::Result<()> {
    let setup_password = identity::setup_password()?;
    info!("Setup password: {}", setup_password);

    let portal = EspPortal::new(config.http.port);
    let manager = ConnectionManager::spawn(config, setup_password, store, radio, portal);
    let _subscriptions = subscribe_link_events(sysloop, LinkEventBridge::new(manager.clone()))?;

    let report = |outcome: ConnectionOutcome| info!("Provisioning result: {}", outcome);
    match action {
        BootAction::StartPortal => manager.start_portal(report).await?,
        BootAction::Connect => manager.connect(false, report).await?,
        BootAction::Sleep => return Ok(()),
    }

    let mut state = manager.subscribe();
    state
        .wait_for(|s| *s == ConnectionState::Disabled)
        .await?;
    manager.shutdown().await?;
    Ok(())
}

fn wake_cause() -> WakeCause {
    #[allow(non_upper_case_globals)]
    match unsafe { sys::esp_sleep_get_wakeup_cause() } {
        sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 => WakeCause::Switch,
        sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::Timer,
        sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => WakeCause::ColdBoot,
        _ => WakeCause::Other,
    }
}

fn enter_deep_sleep() -> ! {
    info!(
        "Entering deep sleep; wake on GPIO{} (low) or after {:?}",
        WAKE_PIN, SLEEP_DURATION
    );
    unsafe {
        sys::esp_sleep_enable_timer_wakeup(SLEEP_DURATION.as_micros() as u64);
        sys::rtc_gpio_init(WAKE_PIN);
        sys::rtc_gpio_set_direction(WAKE_PIN, sys::rtc_gpio_mode_t_RTC_GPIO_MODE_INPUT_ONLY);
        sys::rtc_gpio_pullup_en(WAKE_PIN);
        sys::rtc_gpio_pulldown_dis(WAKE_PIN);
        sys::esp_sleep_enable_ext0_wakeup(WAKE_PIN, 0);
        sys::esp_deep_sleep_start()
    }
}

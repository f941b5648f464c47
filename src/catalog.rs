//! # Station entity catalog.
//!
//! Every value the station exchanges with the MCU, the dashboard and the store is
//! declared here once, with its id and flags. Workers hold a reference to the
//! catalog and read or request changes on its entities.
//!
//! | prefix       | content                                   | flags                      |
//! |--------------|-------------------------------------------|----------------------------|
//! | `gpio/`      | relay switches driven by the MCU          | publish, ack               |
//! | `feature/`   | operator toggles                          | persist, ack (some publish)|
//! | `mcu/`, `weather/`, `battery/`, `solar/`, `system/` | telemetry | publish            |
//! | `mppt/`      | charger telemetry and voltage thresholds  | mixed                      |
//! | `watchdog/`  | watchdog state reported by the MCU        | mixed                      |
//! | `lora/`      | last APRS/Meshtastic frames, nodes online | publish                    |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{DynEntity, Entity, EntityRef};
use crate::error::RegistryError;
use crate::registry::Registry;

/// Radio network a LoRa frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoraNetwork {
    #[serde(rename = "APRS")]
    Aprs,
    Meshtastic,
}

/// One LoRa frame, as shown on the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoraMessage {
    #[serde(rename = "type")]
    pub network: LoraNetwork,
    pub sender: Option<String>,
    pub frame: String,
    pub created_at: DateTime<Utc>,
    pub is_tx: bool,
}

/// A Meshtastic node heard recently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshtasticNode {
    pub name: String,
    pub last_heard: DateTime<Utc>,
}

macro_rules! catalog {
    (
        $(
            $(#[$meta:meta])*
            $field:ident : $ty:ty = ($id:literal, $init:expr) $(. $flag:ident ())* ;
        )*
    ) => {
        /// The station's entities.
        pub struct StationEntities {
            $(
                $(#[$meta])*
                pub $field: EntityRef<$ty>,
            )*
        }

        impl StationEntities {
            /// Creates every entity at its initial value.
            pub fn new() -> Self {
                Self {
                    $(
                        $field: Entity::new($id, $init) $(.$flag())* .into_ref(),
                    )*
                }
            }

            /// Registers every entity, in declaration order.
            pub async fn register_all(&self, registry: &Registry) -> Result<(), RegistryError> {
                $(
                    registry.register(&self.$field).await?;
                )*
                tracing::info!(entities = self.handles().len(), "station entities registered");
                Ok(())
            }

            /// Type-erased handles, in declaration order.
            pub fn handles(&self) -> Vec<DynEntity> {
                vec![$(self.$field.clone() as DynEntity),*]
            }
        }
    };
}

catalog! {
    gpio_wifi: bool = ("gpio/wifi", false).publish().require_ack();
    gpio_npr: bool = ("gpio/npr", false).publish().require_ack();
    gpio_meshtastic: bool = ("gpio/meshtastic", false).publish().require_ack();
    /// Light level inside the box.
    gpio_box_ldr: i32 = ("gpio/box_ldr", 0);

    status_box_opened: bool = ("status/box_opened", false).publish();

    mcu_status: String = ("mcu/status", String::new()).publish();
    mcu_temperature_rtc: f32 = ("mcu/temperature_rtc", 0.0).publish();
    /// Seconds.
    mcu_uptime: u64 = ("mcu/uptime", 0).publish();

    feature_mppt_watchdog_safety: bool = ("feature/mppt_watchdog_safety", false).persist().require_ack();
    feature_watchdog: bool = ("feature/watchdog", false).persist().require_ack();
    feature_watchdog_lora_tx: bool = ("feature/watchdog_lora_tx", false).persist().require_ack();
    feature_aprs_digipeater: bool = ("feature/aprs_digipeater", true).persist().require_ack();
    feature_aprs_telemetry: bool = ("feature/aprs_telemetry", true).persist().require_ack();
    feature_aprs_position: bool = ("feature/aprs_position", true).persist().require_ack();
    feature_sleep: bool = ("feature/sleep", false).persist().require_ack();
    feature_reset_on_error: bool = ("feature/reset_on_error", false).persist().require_ack();

    weather_temperature: f32 = ("weather/temperature", 0.0).publish();
    weather_humidity: f32 = ("weather/humidity", 0.0).publish();
    weather_pressure: f32 = ("weather/pressure", 0.0).publish();

    /// Millivolts.
    battery_voltage: i32 = ("battery/voltage", 0).publish();
    /// Milliamps.
    battery_current: i32 = ("battery/current", 0).publish();
    solar_voltage: i32 = ("solar/voltage", 0).publish();
    solar_current: i32 = ("solar/current", 0).publish();
    solar_is_day: bool = ("solar/is_day", false).publish();

    mppt_charge_current: i32 = ("mppt/charge_current", 0);
    mppt_status: String = ("mppt/status", String::new());
    mppt_alert_shutdown: bool = ("mppt/alert_shutdown", false).publish();
    mppt_power_enabled: bool = ("mppt/power_enabled", false);
    /// Millivolts below which the charger cuts the load.
    mppt_power_off_voltage: i32 = ("mppt/power_off_voltage", 11500).persist().require_ack();
    /// Millivolts above which the charger restores the load.
    mppt_power_on_voltage: i32 = ("mppt/power_on_voltage", 12500).persist().require_ack();
    mppt_temperature: f32 = ("mppt/temperature", 0.0).publish();

    watchdog_enabled: bool = ("watchdog/enabled", false).publish();
    /// Seconds.
    watchdog_counter: u64 = ("watchdog/counter", 0);
    /// Seconds.
    watchdog_power_off_time: u64 = ("watchdog/power_off_time", 0).publish();

    lora_aprs_tx_payload: Option<LoraMessage> = ("lora/aprs/tx_payload", None).publish();
    lora_aprs_rx_payload: Option<LoraMessage> = ("lora/aprs/rx_payload", None).publish();
    lora_meshtastic_tx_payload: Option<LoraMessage> = ("lora/meshtastic/tx_payload", None).publish();
    lora_meshtastic_rx_payload: Option<LoraMessage> = ("lora/meshtastic/rx_payload", None).publish();
    lora_meshtastic_nodes_online: Vec<MeshtasticNode> = ("lora/meshtastic/nodes_onlines", Vec::new()).publish();

    /// Seconds.
    system_uptime: u64 = ("system/uptime", 0).publish();
    /// Percent.
    system_cpu: i32 = ("system/cpu", 0);
    /// Percent.
    system_ram: i32 = ("system/ram", 0);
    /// Percent.
    system_disk: i32 = ("system/disk", 0).publish();
}

impl Default for StationEntities {
    fn default() -> Self {
        Self::new()
    }
}

//! 总线主题与传感器事件名。

pub const GATEWAY_STATUS_TOPIC: &str = "status/gateway";
pub const SENSOR_STATUS_TOPIC: &str = "status/sensor";
pub const TEMPERATURE_TOPIC: &str = "measurement/temperature";
pub const RAIN_TOPIC: &str = "measurement/rain";
pub const SENSOR_EVENT_TOPIC: &str = "sensor/event";

/// 接收侧订阅的全部主题。
pub const ALL_TOPICS: [&str; 5] = [
    RAIN_TOPIC,
    TEMPERATURE_TOPIC,
    GATEWAY_STATUS_TOPIC,
    SENSOR_STATUS_TOPIC,
    SENSOR_EVENT_TOPIC,
];

pub const SENSOR_PAUSE_EVENT: &str = "sensorPause";
pub const SENSOR_UNPAUSE_EVENT: &str = "sensorUnpause";
pub const SENSOR_SOFT_RESET_EVENT: &str = "sensorSoftReset";
pub const SENSOR_HARD_RESET_EVENT: &str = "sensorHardReset";

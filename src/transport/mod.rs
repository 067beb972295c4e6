//! Transport side: the external MQTT client. Connection handling,
//! reconnects and QoS are rumqttc's job; this module only turns
//! incoming publishes into [`InboundEvent`]s for the aggregator.
//!
//! [`InboundEvent`]: crate::aggregator::record::InboundEvent

pub mod mqtt_client;

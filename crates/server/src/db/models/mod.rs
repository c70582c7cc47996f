/// 数据模型

pub mod api_token;
pub mod booking;
pub mod booking_notify_state;
pub mod host;
pub mod host_profile;
pub mod interface;
pub mod job;
pub mod lab;
pub mod notification;
pub mod public_network;
pub mod resource_bundle;
pub mod resource_template;
pub mod task_config;
pub mod user;
pub mod vlan_manager;

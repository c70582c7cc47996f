/// 业务服务层

pub mod booking_service;
pub mod job_service;
pub mod lab_service;
pub mod notify_service;
pub mod resource_service;
pub mod user_service;
pub mod vlan_service;

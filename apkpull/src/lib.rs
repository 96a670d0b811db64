//! Pulls the APKs of the apps installed on an Android device, and mirrors folders from its storage,
//! using the Android Debug Bridge.

pub mod adb;
pub mod app_name;
pub mod harvest;
pub mod ledger;
pub mod manifest;
pub mod mirror;
pub mod sanitize;

#[cfg(test)]
mod mock;

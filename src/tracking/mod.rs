//! A tracking session measures one [activity::Activity] while a
//! [live_display::LiveDisplay] shows how long it has been running.

pub mod activity;
pub mod live_display;
pub mod shutdown;

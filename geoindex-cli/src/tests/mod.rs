//! Shared test harness modules for the geoindex CLI.

use super::*;

mod helpers;

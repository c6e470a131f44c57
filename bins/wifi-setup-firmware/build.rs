//! Build script for the WiFi setup firmware.
//!
//! Exports the ESP-IDF environment so esp-idf-svc can find the toolchain.

fn main() {
    embuild::espidf::sysenv::output();
}

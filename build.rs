// build.rs

use std::env;

fn main() -> anyhow::Result<()> {
    // Necessary because of this issue: https://github.com/rust-lang/cargo/issues/9641
    // see also https://github.com/rust-lang/cargo/issues/9554
    // Only meaningful when linking against esp-idf-sys; host builds skip it.
    if env::var_os("CARGO_FEATURE_ESP").is_some() {
        embuild::build::CfgArgs::output_propagated("ESP_IDF")?;
        embuild::build::LinkArgs::output_propagated("ESP_IDF")?;
    }

    let wifi_ssid = env::var("WIFI_SSID").unwrap_or_else(|_| "internet".into());
    let wifi_pass = env::var("WIFI_PASS").unwrap_or_else(|_| "password".into());
    let station_name = env::var("STATION_NAME").unwrap_or_else(|_| "tempnode".into());
    let dest_uri = env::var("DEST_URI").unwrap_or_else(|_| "coap://coap.local/temperature".into());

    println!("cargo:rustc-env=WIFI_SSID={wifi_ssid}");
    println!("cargo:rustc-env=WIFI_PASS={wifi_pass}");
    println!("cargo:rustc-env=STATION_NAME={station_name}");
    println!("cargo:rustc-env=DEST_URI={dest_uri}");
    for var in ["WIFI_SSID", "WIFI_PASS", "STATION_NAME", "DEST_URI"] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    Ok(())
}

// EOF

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use lua_harness::{
    scan::{AccessPoint, ScanConfig, ScanFixture, ScanSubsystem, SimulatedRadio},
    ScanError,
};
use tempfile::NamedTempFile;

fn networks(n: usize) -> Vec<AccessPoint> {
    // rssi deliberately out of order
    (0..n)
        .map(|i| AccessPoint {
            ssid: format!("net-{:02}", i),
            rssi: -30 - ((i * 7) % 60) as i8,
        })
        .collect()
}

fn subsystem(fixture: ScanFixture) -> ScanSubsystem<SimulatedRadio> {
    ScanSubsystem::new(SimulatedRadio::new(fixture))
}

#[test]
fn scan_is_bounded_and_strongest_first() -> Result<()> {
    let mut radio = subsystem(ScanFixture {
        networks: networks(15),
        ..ScanFixture::default()
    });

    let set = radio.scan(&ScanConfig::default())?;
    assert_eq!(set.records.len(), 10);
    assert_eq!(set.capacity, 10);
    assert_eq!(set.discovered, 15);
    assert!(set.is_truncated());
    assert!(set.records.windows(2).all(|w| w[0].rssi >= w[1].rssi));

    // the ten kept are the ten strongest
    let mut all: Vec<i8> = networks(15).iter().map(|ap| ap.rssi).collect();
    all.sort_by(|a, b| b.cmp(a));
    let kept: Vec<i8> = set.records.iter().map(|ap| ap.rssi).collect();
    assert_eq!(kept, all[..10]);

    assert_eq!(radio.driver().init_count(), 1);
    assert_eq!(radio.driver().deinit_count(), 1);
    assert!(!radio.is_acquired());
    Ok(())
}

#[test]
fn empty_scan_is_not_an_error() -> Result<()> {
    let mut radio = subsystem(ScanFixture::default());
    let set = radio.scan(&ScanConfig::default())?;
    assert!(set.records.is_empty());
    assert!(!set.is_truncated());
    Ok(())
}

#[test]
fn filters_hidden_and_targeted_networks() -> Result<()> {
    let fixture = ScanFixture {
        networks: vec![
            AccessPoint { ssid: "lab".into(), rssi: -50 },
            AccessPoint { ssid: String::new(), rssi: -40 },
            AccessPoint { ssid: "guest".into(), rssi: -60 },
        ],
        ..ScanFixture::default()
    };
    let mut radio = subsystem(fixture);

    let visible = radio.scan(&ScanConfig {
        include_hidden: false,
        ..ScanConfig::default()
    })?;
    assert_eq!(visible.records.len(), 2);
    assert!(visible.records.iter().all(|ap| !ap.ssid.is_empty()));

    let all = radio.scan(&ScanConfig::default())?;
    assert_eq!(all.records[0].ssid, "");

    let target = radio.scan(&ScanConfig {
        target_filter: Some("guest".into()),
        ..ScanConfig::default()
    })?;
    assert_eq!(target.records, vec![AccessPoint { ssid: "guest".into(), rssi: -60 }]);

    assert_eq!(radio.driver().init_count(), 3);
    assert_eq!(radio.driver().deinit_count(), 3);
    Ok(())
}

#[test]
fn failed_init_is_a_distinct_error_and_still_releases() {
    let mut radio = subsystem(ScanFixture {
        networks: networks(3),
        fail_init: true,
        ..ScanFixture::default()
    });

    let err = radio.scan(&ScanConfig::default()).unwrap_err();
    assert!(matches!(err, ScanError::SubsystemAcquisition(_)), "{:?}", err);
    assert_eq!(radio.driver().deinit_count(), 1);
    assert!(!radio.driver().is_running());
    assert!(!radio.is_acquired());
}

#[test]
fn scan_failures_and_timeouts_release_the_radio() {
    let mut radio = subsystem(ScanFixture {
        fail_scan: true,
        ..ScanFixture::default()
    });
    let err = radio.scan(&ScanConfig::default()).unwrap_err();
    assert!(matches!(err, ScanError::ScanFailed(_)));
    assert_eq!(radio.driver().deinit_count(), 1);

    let mut slow = subsystem(ScanFixture {
        networks: networks(2),
        scan_time_ms: 500,
        ..ScanFixture::default()
    });
    let err = slow
        .scan(&ScanConfig {
            timeout: Duration::from_millis(100),
            ..ScanConfig::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("timed out"), "{}", err);
    assert!(!slow.driver().is_running());
}

#[test]
fn leaked_lease_blocks_reacquire() {
    let mut radio = subsystem(ScanFixture::default());
    let lease = radio.acquire().unwrap();
    std::mem::forget(lease);

    assert!(radio.is_acquired());
    assert!(matches!(radio.acquire(), Err(ScanError::AlreadyAcquired)));
    assert_eq!(radio.driver().init_count(), 1);
}

#[test]
fn fixture_loads_from_json() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(
        file,
        r#"{{ "scan_time_ms": 20, "networks": [{{ "ssid": "lab", "rssi": -41 }}] }}"#
    )?;

    let fixture = ScanFixture::load(file.path())?;
    assert_eq!(fixture.networks.len(), 1);
    assert_eq!(fixture.scan_time_ms, 20);
    assert!(!fixture.fail_init);

    let bundled = ScanFixture::load(std::path::Path::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/assets/networks.json"
    )))?;
    assert!(!bundled.networks.is_empty());
    Ok(())
}

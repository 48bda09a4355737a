use std::sync::Arc;

use conreald::config::AppConfig;
use conreald::core::ServiceIdentity;
use conreald::discovery::{Advertiser, DiscoveryBackend, SimulatedBackend, get_backend};
use conreald::error::{RegistrationError, RetractionError};

fn identity(port: u16) -> ServiceIdentity {
    ServiceIdentity::new(&AppConfig::default(), port)
}

#[test]
fn publish_and_withdraw() {
    let (backend, control) = SimulatedBackend::new();

    let key = backend.publish(&identity(5555)).unwrap();
    let published = control.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, key);
    assert_eq!(
        published[0].identity.metadata,
        vec![format!("version={}", conreald::VERSION)]
    );

    backend.withdraw(&key).unwrap();
    assert!(control.published().is_empty());
    assert!(matches!(
        backend.withdraw(&key),
        Err(RetractionError::Unknown(_))
    ));
}

#[test]
fn duplicate_record_rejected() {
    let (backend, _control) = SimulatedBackend::new();

    backend.publish(&identity(5555)).unwrap();
    assert!(matches!(
        backend.publish(&identity(5556)),
        Err(RegistrationError::Rejected(_))
    ));
}

#[test]
fn recovers_after_outage() {
    let (backend, control) = SimulatedBackend::new();
    let advertiser = Advertiser::new(Arc::new(backend));

    control.set_reachable(false);
    assert!(advertiser.register(&identity(5555)).is_err());

    control.set_reachable(true);
    let mut ad = advertiser.register(&identity(5555)).unwrap();
    assert_eq!(control.publish_count(), 2);

    ad.retract();
    ad.retract();
    assert_eq!(control.withdraw_count(), 1);
}

#[test]
fn simulation_backend_from_config() {
    let backend = get_backend(true);
    let key = backend.publish(&identity(6000)).unwrap();
    assert!(key.ends_with("._conreality._tcp.local."));
    backend.withdraw(&key).unwrap();
}

//! Every demo scenario runs to completion against an in-process ledger.

use std::sync::Arc;
use std::time::Duration;

use timelock_client::scenarios::{self, DEMO_LOCK_PERIOD};
use timelock_client::{
    ClientError, Deployment, LocalTransport, Scenario, VaultClient, VaultTransport,
};
use timelock_protocol::types::WEI_PER_ETH;
use timelock_protocol::vault::DepositState;
use timelock_protocol::{Address, LedgerParams, VaultError};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn rewards_scenario_on_a_fresh_ledger() {
    let reports = scenarios::run(Scenario::Rewards, &Deployment::Local(LedgerParams::default()), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].scenario, Scenario::Rewards);
    assert_eq!(reports[0].steps, 5);
    assert_eq!(reports[0].ledger_elapsed, 30);
}

#[tokio::test]
async fn emergency_scenario_on_a_fresh_ledger() {
    let reports = scenarios::run(
        Scenario::Emergency,
        &Deployment::Local(LedgerParams::default()),
        TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(reports[0].steps, 6);
    assert_eq!(reports[0].ledger_elapsed, 0);
}

#[tokio::test]
async fn withdrawal_scenario_waits_out_the_lock() {
    let reports = scenarios::run(
        Scenario::Withdrawal,
        &Deployment::Local(LedgerParams::default()),
        TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(reports[0].steps, 6);
    assert_eq!(reports[0].ledger_elapsed, DEMO_LOCK_PERIOD);
}

#[tokio::test]
async fn all_runs_every_scenario_in_order() {
    let reports = scenarios::run(Scenario::All, &Deployment::Local(LedgerParams::default()), TIMEOUT)
        .await
        .unwrap();
    let order: Vec<Scenario> = reports.iter().map(|r| r.scenario).collect();
    assert_eq!(order, Scenario::SEQUENCE.to_vec());
}

#[tokio::test]
async fn all_scenarios_share_one_deployment() {
    let local = LocalTransport::new(LedgerParams::default(), 1_700_000_000).unwrap();
    let transport: Arc<dyn VaultTransport> = Arc::new(local.clone());

    let reports = scenarios::run(Scenario::All, &Deployment::Remote(Arc::clone(&transport)), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reports.len(), 3);

    // The emergency scenario ran last and left the vault closed to deposits.
    let late = VaultClient::new(transport, Address::from_label("latecomer"));
    assert!(late.emergency_mode().await.unwrap());
    let err = late
        .deposit(WEI_PER_ETH, DEMO_LOCK_PERIOD)
        .await
        .unwrap()
        .confirmed()
        .await
        .unwrap_err();
    assert_eq!(err.vault_error(), Some(&VaultError::EmergencyModeActive));

    // Only the rewards depositor still holds principal.
    let rewards_alice = Address::from_label("rewards/alice");
    let status = late.deposit_status(&rewards_alice).await.unwrap();
    assert_eq!(status.status, DepositState::Unlockable);
    assert_eq!(late.total_locked().await.unwrap(), WEI_PER_ETH * 3 / 2);
    assert!(local.service().ledger().audit().is_ok());
}

#[tokio::test]
async fn foreign_owner_stops_the_demo() {
    let transport: Arc<dyn VaultTransport> =
        Arc::new(LocalTransport::new(LedgerParams::default(), 1_700_000_000).unwrap());
    VaultClient::new(Arc::clone(&transport), Address::from_label("someone-else"))
        .initialize(1, 1)
        .await
        .unwrap()
        .confirmed()
        .await
        .unwrap();

    let err = scenarios::run(Scenario::Rewards, &Deployment::Remote(transport), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unexpected(ref msg) if msg.contains("not the demo owner")));
}

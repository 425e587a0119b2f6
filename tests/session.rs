use alloy_primitives::{
    Address,
    U256,
    address,
};
use divebar_client::{
    client::Controller,
    contract::GameState,
    network::{
        Network,
        NetworkTable,
    },
    session::{
        SessionManager,
        WalletEvent,
    },
    state::{
        Event,
        NO_WALLET_ALERT,
    },
    test_helpers::{
        FakeWallet,
        settle,
    },
};
use std::time::Duration;

const ALICE: Address = address!("00000000000000000000000000000000000000a1");
const BOB: Address = address!("00000000000000000000000000000000000000b0");
const CONTRACT: Address = address!("00000000000000000000000000000000000000c0");

fn networks() -> NetworkTable {
    NetworkTable::new([(Network::Kovan, CONTRACT)])
}

fn controller(wallet: &FakeWallet) -> Controller<FakeWallet> {
    wallet.set_game(GameState {
        id: U256::from(1u64),
        ..GameState::default()
    });
    Controller::new(Some(wallet.clone()), networks(), Duration::from_secs(2))
}

#[tokio::test]
async fn restore__picks_up_authorized_account_without_prompt() {
    let wallet = FakeWallet::with_account(42, ALICE);
    let manager = SessionManager::new(Some(wallet));

    let session = manager.restore().await.unwrap();

    assert_eq!(session.account, Some(ALICE));
    assert_eq!(session.chain_id, Some(42));
}

#[tokio::test]
async fn restore__unauthorized_wallet_still_shows_game() {
    // given
    let wallet = FakeWallet::with_account(42, ALICE);
    wallet.set_authorized(false);
    let mut controller = controller(&wallet);

    // when
    controller.restore();
    settle(controller.run_until(|s| s.game.is_some())).await;

    // then
    assert_eq!(controller.state().session.account, None);
    assert!(controller.state().position.is_none());
}

#[tokio::test]
async fn connect__authorizes_account_and_loads_position() {
    let wallet = FakeWallet::with_account(42, ALICE);
    wallet.set_authorized(false);
    let mut controller = controller(&wallet);
    controller.restore();
    settle(controller.run_until(|s| s.game.is_some())).await;

    controller.dispatch(Event::ConnectRequested);
    settle(controller.run_until(|s| s.position.is_some() && s.claimable.is_some())).await;

    assert_eq!(controller.state().session.account, Some(ALICE));
    assert!(controller.state().pending.is_none());
}

#[tokio::test]
async fn connect__denied_request_is_reported() {
    let wallet = FakeWallet::with_account(42, ALICE);
    wallet.set_authorized(false);
    wallet.deny_connect(true);
    let mut controller = controller(&wallet);

    controller.dispatch(Event::ConnectRequested);
    settle(controller.run_until(|s| s.pending.is_none())).await;

    let state = controller.state();
    assert_eq!(state.session.account, None);
    assert!(state.errors.iter().any(|e| e.starts_with("Connect failed")));
}

#[tokio::test]
async fn connect__without_wallet_asks_user_to_install_one() {
    let mut controller: Controller<FakeWallet> =
        Controller::new(None, networks(), Duration::from_secs(2));

    assert!(controller.spawn_wallet_watcher(Duration::from_millis(10)).is_none());
    controller.dispatch(Event::ConnectRequested);

    assert_eq!(controller.state().alert.as_deref(), Some(NO_WALLET_ALERT));
    assert!(!controller.state().wallet_present);
}

#[tokio::test]
async fn watcher__reports_account_and_network_switches() {
    // given
    let wallet = FakeWallet::with_account(42, ALICE);
    let mut controller = controller(&wallet);
    let mut events = controller
        .spawn_wallet_watcher(Duration::from_millis(10))
        .unwrap();
    assert_eq!(events.recv().await, Some(WalletEvent::ChainChanged(42)));
    assert_eq!(
        events.recv().await,
        Some(WalletEvent::AccountsChanged(vec![ALICE]))
    );

    // when
    wallet.set_accounts(vec![BOB]);
    wallet.set_chain_id(4_002);

    // then
    let mut seen = Vec::new();
    settle(async {
        while seen.len() < 2 {
            if let Some(event) = events.recv().await {
                seen.push(event);
            }
        }
    })
    .await;
    assert!(seen.contains(&WalletEvent::ChainChanged(4_002)));
    assert!(seen.contains(&WalletEvent::AccountsChanged(vec![BOB])));
}

#[tokio::test]
async fn watcher__account_switch_resets_player_data() {
    let wallet = FakeWallet::with_account(42, ALICE);
    let mut controller = controller(&wallet);
    controller.restore();
    settle(controller.run_until(|s| s.position.is_some())).await;

    controller.dispatch(Event::Wallet(WalletEvent::AccountsChanged(vec![BOB])));

    let state = controller.state();
    assert_eq!(state.session.account, Some(BOB));
    assert!(state.position.is_none());
    assert!(state.claimable.is_none());
}

use crate::{
    contract::{
        DiveBar,
        GameState,
    },
    error::{
        BetRejection,
        ContractError,
    },
    format::unix_seconds,
    provider::{
        TransactionReceipt,
        WalletProvider,
    },
};
use alloy_primitives::{
    Address,
    U256,
    utils::parse_ether,
};
use chrono::{
    DateTime,
    Utc,
};
use tracing::{
    debug,
    info,
};

/// A bet that passed every local precondition. Only [`validate_bet`]
/// creates one, so holding it means no guaranteed-revert transaction will
/// be sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidatedBet {
    amount: U256,
    round: U256,
}

impl ValidatedBet {
    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Game id the bet was validated against.
    pub fn round(&self) -> U256 {
        self.round
    }
}

/// Parses a whole-token amount such as `0.05` into base units.
pub fn parse_bet_amount(input: &str) -> Result<U256, BetRejection> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BetRejection::ZeroAmount);
    }
    let unparsable = || BetRejection::Unparsable {
        input: trimmed.to_string(),
    };
    // parse_ether accepts a sign and wraps negatives into huge values
    if trimmed.starts_with(['-', '+']) {
        return Err(unparsable());
    }
    let amount = parse_ether(trimmed).map_err(|_| unparsable())?;
    if amount.is_zero() {
        return Err(BetRejection::ZeroAmount);
    }
    Ok(amount)
}

pub fn validate_bet(
    input: &str,
    game: Option<&GameState>,
    already_bet: bool,
    now: DateTime<Utc>,
) -> Result<ValidatedBet, BetRejection> {
    let amount = parse_bet_amount(input)?;
    let game = game.ok_or(BetRejection::NoGame)?;
    if already_bet {
        return Err(BetRejection::AlreadyBet);
    }
    if amount < game.min_deposit {
        return Err(BetRejection::BelowMinimum {
            amount,
            minimum: game.min_deposit,
        });
    }
    let ends_ms = i128::from(unix_seconds(game.ending_at)) * 1_000;
    if i128::from(now.timestamp_millis()) >= ends_ms {
        return Err(BetRejection::GameEnded);
    }
    Ok(ValidatedBet {
        amount,
        round: game.id,
    })
}

/// Sends the two state-changing transactions.
#[derive(Clone, Debug)]
pub struct ActionSubmitter<P> {
    contract: DiveBar<P>,
}

impl<P: WalletProvider> ActionSubmitter<P> {
    pub fn new(contract: DiveBar<P>) -> Self {
        Self { contract }
    }

    /// Transfers exactly the validated amount. The gas price is looked up
    /// for the log only and is never added to the value.
    pub async fn place_bet(
        &self,
        from: Address,
        bet: ValidatedBet,
    ) -> Result<TransactionReceipt, ContractError> {
        match self.contract.provider().gas_price().await {
            Ok(gas_price) => debug!(%gas_price, "current gas price"),
            Err(err) => debug!(?err, "gas price unavailable"),
        }
        info!(%from, amount = %bet.amount(), round = %bet.round(), "placing bet");
        self.contract.deposit(from, bet.amount()).await
    }

    pub async fn withdraw(&self, from: Address) -> Result<TransactionReceipt, ContractError> {
        info!(%from, "claiming payout");
        self.contract.claim_payout(from).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::test_helpers::FakeWallet;
    use alloy_primitives::address;
    use proptest::prelude::*;
    use std::time::Duration;

    const ALICE: Address = address!("00000000000000000000000000000000000000a1");
    const CONTRACT: Address = address!("00000000000000000000000000000000000000c0");
    const MILLI: u64 = 1_000_000_000_000_000;
    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(NOW, 0).unwrap()
    }

    fn game() -> GameState {
        GameState {
            id: U256::from(7u64),
            min_deposit: U256::from(MILLI),
            ending_at: U256::from((NOW + 600) as u64),
            ..GameState::default()
        }
    }

    #[test]
    fn parse_bet_amount__rejects_signed_input() {
        for input in ["-1", " -0.5", "+1"] {
            assert!(matches!(
                parse_bet_amount(input),
                Err(BetRejection::Unparsable { .. })
            ));
        }
        assert!(matches!(
            validate_bet("-1", Some(&game()), false, now()),
            Err(BetRejection::Unparsable { .. })
        ));
    }

    #[test]
    fn parse_bet_amount__reads_decimal_tokens() {
        assert_eq!(parse_bet_amount("0.001").unwrap(), U256::from(MILLI));
        assert_eq!(parse_bet_amount(" 2 ").unwrap(), U256::from(2_000 * MILLI));
    }

    #[test]
    fn parse_bet_amount__rejects_zero_and_garbage() {
        assert_eq!(parse_bet_amount(""), Err(BetRejection::ZeroAmount));
        assert_eq!(parse_bet_amount("0.000"), Err(BetRejection::ZeroAmount));
        assert!(matches!(
            parse_bet_amount("lots"),
            Err(BetRejection::Unparsable { .. })
        ));
    }

    #[test]
    fn validate_bet__accepts_minimum_before_deadline() {
        let bet = validate_bet("0.001", Some(&game()), false, now()).unwrap();
        assert_eq!(bet.amount(), U256::from(MILLI));
        assert_eq!(bet.round(), U256::from(7u64));
    }

    #[test]
    fn validate_bet__blocks_at_deadline() {
        let mut game = game();
        game.ending_at = U256::from(NOW as u64);
        assert_eq!(
            validate_bet("1", Some(&game), false, now()),
            Err(BetRejection::GameEnded)
        );
    }

    #[test]
    fn validate_bet__blocks_second_bet_in_round() {
        assert_eq!(
            validate_bet("1", Some(&game()), true, now()),
            Err(BetRejection::AlreadyBet)
        );
    }

    #[test]
    fn validate_bet__needs_game_state() {
        assert_eq!(validate_bet("1", None, false, now()), Err(BetRejection::NoGame));
    }

    #[tokio::test]
    async fn place_bet__contract_revert_surfaces_as_error() {
        // given: the chain already sees the game as over
        let wallet = FakeWallet::new(42);
        wallet.set_game(game());
        wallet.set_now((NOW + 700) as u64);
        let submitter = ActionSubmitter::new(
            DiveBar::new(wallet.clone(), CONTRACT).with_receipt_poll(Duration::from_millis(1)),
        );
        let bet = validate_bet("1", Some(&game()), false, now()).unwrap();

        // when
        let result = submitter.place_bet(ALICE, bet).await;

        // then
        assert!(matches!(result, Err(ContractError::Reverted { .. })));
        assert_eq!(wallet.transactions().len(), 1);
    }

    #[tokio::test]
    async fn withdraw__empty_balance_reverts() {
        let wallet = FakeWallet::new(42);
        let submitter = ActionSubmitter::new(DiveBar::new(wallet, CONTRACT));

        let result = submitter.withdraw(ALICE).await;

        assert!(matches!(result, Err(ContractError::Reverted { .. })));
    }

    proptest! {
        #[test]
        fn validate_bet__blocks_anything_below_minimum(amount in 1u64..MILLI) {
            let input = format!("0.{amount:018}");
            let result = validate_bet(&input, Some(&game()), false, now());
            let blocked = matches!(result, Err(BetRejection::BelowMinimum { .. }));
            prop_assert!(blocked);
        }

        #[test]
        fn validate_bet__blocks_after_deadline(late_by in 0i64..1_000_000) {
            let at = DateTime::<Utc>::from_timestamp(NOW + 600 + late_by, 0).unwrap();
            prop_assert_eq!(
                validate_bet("1", Some(&game()), false, at),
                Err(BetRejection::GameEnded)
            );
        }
    }
}

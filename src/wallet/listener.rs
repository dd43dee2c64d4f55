//! Narrow observer interfaces for wallet events (spec.md §9): listeners run
//! on the thread that produced the event and must not call back into
//! mutating wallet operations.

use crate::blockchain::Transaction;
use crate::wallet::amount::Amount;

/// Receives `CoinsReceived` and `DeadTransaction` notifications.
pub trait WalletListener: Send + Sync {
    /// `tx` paid us money and is now confirmed or newly pending.
    fn coins_received(&self, tx: &Transaction, prev_balance: Amount, new_balance: Amount);

    /// `dead_tx` lost a double-spend race to `replacement_tx` (spec.md
    /// §4.8 step 4, the Finney-attack path).
    fn dead_transaction(&self, dead_tx: &Transaction, replacement_tx: &Transaction);
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Records every event it receives, for assertions in wallet tests.
    #[derive(Default)]
    pub struct RecordingListener {
        pub coins_received: Mutex<Vec<(Transaction, Amount, Amount)>>,
        pub dead_transactions: Mutex<Vec<(Transaction, Transaction)>>,
    }

    impl WalletListener for RecordingListener {
        fn coins_received(&self, tx: &Transaction, prev_balance: Amount, new_balance: Amount) {
            self.coins_received.lock().push((tx.clone(), prev_balance, new_balance));
        }

        fn dead_transaction(&self, dead_tx: &Transaction, replacement_tx: &Transaction) {
            self.dead_transactions
                .lock()
                .push((dead_tx.clone(), replacement_tx.clone()));
        }
    }
}

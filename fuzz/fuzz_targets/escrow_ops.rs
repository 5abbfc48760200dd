#![no_main]

use libfuzzer_sys::fuzz_target;

use vedist_core::invariants::check_escrow;
use vedist_core::types::{DAY, WEEK};
use vedist_core::{
    AccountId, Amount, InMemoryToken, TokenId, TransferService, VedistConfig, VotingEscrow,
};

const MAX_OPS: usize = 128;
const ACCOUNTS: u8 = 4;
const T0: u64 = 2844 * WEEK;

struct Cursor<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, index: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.index.checked_add(n)?;
        if end > self.bytes.len() {
            return None;
        }
        let out = &self.bytes[self.index..end];
        self.index = end;
        Some(out)
    }

    fn take_u8(&mut self) -> Option<u8> {
        Some(*self.take(1)?.first()?)
    }

    fn take_u32_le(&mut self) -> Option<u32> {
        let s = self.take(4)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(s);
        Some(u32::from_le_bytes(out))
    }
}

fuzz_target!(|data: &[u8]| {
    let mut c = Cursor::new(data);
    let bank = InMemoryToken::new();
    let token = TokenId::from_label("fuzz-token");
    let admin = AccountId::from_label("admin");
    let accounts: Vec<AccountId> = (0..ACCOUNTS)
        .map(|i| AccountId::from_label(&format!("acct-{i}")))
        .collect();
    for account in &accounts {
        if bank.mint(token, *account, Amount::from_tokens(u32::MAX as u64)).is_err() {
            return;
        }
    }
    let config = VedistConfig::default();
    let mut ve = match VotingEscrow::new(admin, token, AccountId::from_label("ve"), T0, &config) {
        Ok(ve) => ve,
        Err(_) => return,
    };

    let mut now = T0;
    for _ in 0..MAX_OPS {
        let (op, who, arg, dt) = match (c.take_u8(), c.take_u8(), c.take_u32_le(), c.take_u8()) {
            (Some(op), Some(who), Some(arg), Some(dt)) => (op, who, arg, dt),
            _ => break,
        };
        let account = accounts[(who % ACCOUNTS) as usize];
        now += (dt as u64) * DAY / 8;
        let amount = Amount::from_tokens((arg % 10_000) as u64 + 1);
        let weeks = (arg % 60) as u64;

        let _ = match op % 6 {
            0 => ve.create_lock(&bank, account, amount, now + weeks * WEEK, now).map(|_| ()),
            1 => ve.increase_amount(&bank, account, amount, now).map(|_| ()),
            2 => {
                let end = ve.locked_end(&account);
                ve.increase_unlock_time(&bank, account, end + weeks * WEEK, now).map(|_| ())
            }
            3 => ve.withdraw(&bank, account, now).map(|_| ()),
            4 => ve.toggle_emergency_unlock(admin).map(|_| ()),
            _ => ve.checkpoint(now).map(|_| ()),
        };

        if let Err(v) = check_escrow(&ve, now) {
            panic!("invariant violated after op {op}: {v}");
        }
        assert_eq!(bank.balance_of(token, ve.custody()), ve.supply());
    }
});

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const UID_EXPIRE_SECS: i64 = 300;
const UID_BYTES: usize = 32;

/// Single-use nonces handed out by `/admin/uid`.
///
/// Each UID verifies at most once and never after five minutes; expired
/// entries are collected lazily when touched.
#[derive(Debug, Default)]
pub struct UidStore {
    issued: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl UidStore {
    pub fn issue(&self, n: usize) -> Vec<String> {
        let uids: Vec<String> = (0..n).map(|_| random_uid()).collect();
        let eol = Utc::now() + Duration::seconds(UID_EXPIRE_SECS);
        let mut issued = self.guard();
        for uid in &uids {
            issued.insert(uid.clone(), eol);
        }
        crate::debug!("Generated {n} new UIDs");
        uids
    }

    /// Consumes the UID whether or not it is still live.
    pub fn verify(&self, uid: &str) -> bool {
        let Some(eol) = self.guard().remove(uid) else {
            crate::error!("UID not found: {uid}");
            return false;
        };
        if Utc::now() > eol {
            crate::warn!("UID expired: {uid}");
            return false;
        }
        crate::debug!("UID verified");
        true
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn expire_for_test(&self, uid: &str) {
        self.guard()
            .insert(uid.to_owned(), Utc::now() - Duration::seconds(1));
    }
}

fn random_uid() -> String {
    let mut raw = [0u8; UID_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

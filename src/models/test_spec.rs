//! Test catalog models
//!
//! A catalog entry is a test script identifier optionally followed by extra
//! arguments, written the way it is typed on a command line:
//! `"txn_clone.py --mineblock"`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One selectable test script and the arguments it always runs with
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestSpec {
    pub identifier: String,
    pub args: Vec<String>,
}

impl TestSpec {
    /// Create a spec without extra arguments
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            args: Vec::new(),
        }
    }

    /// Add an extra argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Parse a catalog entry, splitting on whitespace
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split_whitespace();
        let identifier = parts.next()?.to_string();
        Some(Self {
            identifier,
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Identifier without its file extension (`dao/001-x.py` -> `dao/001-x`)
    pub fn stem(&self) -> &str {
        match self.identifier.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => stem,
            _ => &self.identifier,
        }
    }

    /// Whether a user-supplied filter names this test, with or without extension
    pub fn matches(&self, filter: &str) -> bool {
        self.identifier == filter || self.stem() == filter
    }
}

impl TryFrom<String> for TestSpec {
    type Error = String;

    fn try_from(entry: String) -> Result<Self, Self::Error> {
        TestSpec::parse(&entry).ok_or_else(|| format!("empty catalog entry: {entry:?}"))
    }
}

impl From<TestSpec> for String {
    fn from(spec: TestSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for TestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The two ordered test lists a run selects from
///
/// Longer tests go first so they start early when running in parallel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub basic: Vec<TestSpec>,
    #[serde(default)]
    pub extended: Vec<TestSpec>,
}

impl Catalog {
    /// Build a catalog from raw entries, skipping blank ones
    pub fn from_entries<B, E>(basic: B, extended: E) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            basic: basic
                .into_iter()
                .filter_map(|e| TestSpec::parse(e.as_ref()))
                .collect(),
            extended: extended
                .into_iter()
                .filter_map(|e| TestSpec::parse(e.as_ref()))
                .collect(),
        }
    }

    /// All tests, basic first
    pub fn all(&self) -> impl Iterator<Item = &TestSpec> {
        self.basic.iter().chain(self.extended.iter())
    }

    pub fn len(&self) -> usize {
        self.basic.len() + self.extended.len()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_entries(DEFAULT_BASIC, DEFAULT_EXTENDED)
    }
}

const DEFAULT_BASIC: &[&str] = &[
    "staking_mininputvalue.py",
    "wallet.py",
    "wallet-hd.py",
    "receivedby.py",
    "getchaintips.py",
    "rawtransactions.py",
    "rest.py",
    "mempool_spendcoinbase.py",
    "httpbasics.py",
    "multi_rpc.py",
    "zapwallettxes.py",
    "merkle_blocks.py",
    "nodehandling.py",
    "reindex.py",
    "timestampindex.py",
    "disablewallet.py",
    "importprunedfunds.py",
    "signmessages.py",
    "cfund-donate.py",
    "cfund-fork-reorg-preq.py",
    "cfund-fork-reorg-proposal.py",
    "cfund-listproposals.py",
    "cfund-paymentrequest-extract-funds.py",
    "cfund-paymentrequest-payout.py",
    "cfund-paymentrequest-duplicate.py",
    "cfund-paymentrequest-hardfork-452.py",
    "cfund-paymentrequest-state-accept.py",
    "cfund-paymentrequest-state-accept-expired-proposal.py",
    "cfund-paymentrequest-state-expired.py",
    "cfund-proposal-state-accept.py",
    "cfund-proposal-state-expired.py",
    "cfund-reorg.py",
    "cfund-rawtx-create-proposal.py",
    "cfund-rawtx-paymentrequest-vote.py",
    "cfund-rawtx-proposal-vote.py",
    "cfund-vote.py",
    "cfund-proposalvotelist.py",
    "cfund-paymentrequestvotelist.py",
    "cfund-paymentrequest-state-reorg.py",
    "reject-version-bit.py",
    "getcoldstakingaddress.py",
    "getstakereport.py",
    "importaddress.py",
    "coldstaking_staking.py",
    "coldstaking_spending.py",
    "coldstaking_fee.py",
    "staticr-staking-amount.py",
    "hardfork-451.py",
    "hardfork-452.py",
    "staticr-tx-send.py",
    "stakingaddress.py",
    "mnemonic.py",
    "sendtoaddress.py",
    "stakeimmaturebalance.py",
    "rpc-help.py",
    "dao-consultations.py",
    "dao-consultation-consensus.py",
    "dao-consultation-consensus-cycle-length.py",
    "createrawscriptaddress.py",
    "cfunddb-statehash.py",
    "dao/001-proposal-expired.py",
    "dao/002-proposal-rejected.py",
    "dao/003-proposal-accepted.py",
    "dao/004-proposal-expired-preq.py",
    "dao/005-proposal-rejected-preq.py",
    "dao/006-proposal-accepted-preq.py",
];

// pruning.py stays last, it takes a very long time
const DEFAULT_EXTENDED: &[&str] = &[
    "bip9-softforks.py",
    "bip65-cltv.py",
    "bip65-cltv-p2p.py",
    "bip68-sequence.py",
    "bipdersig-p2p.py",
    "bipdersig.py",
    "getblocktemplate_longpoll.py",
    "getblocktemplate_proposals.py",
    "txn_doublespend.py",
    "txn_clone.py --mineblock",
    "forknotify.py",
    "invalidateblock.py",
    "smartfees.py",
    "maxblocksinflight.py",
    "p2p-acceptblock.py",
    "mempool_packages.py",
    "maxuploadtarget.py",
    "replace-by-fee.py",
    "p2p-feefilter.py",
    "pruning.py",
];

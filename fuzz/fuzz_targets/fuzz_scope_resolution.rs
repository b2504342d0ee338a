//! Differential fuzzing of chain resolution against a stack-of-entries
//! oracle: extend/pop/resolve in any order must agree with a plain Vec
//! scan, and the traversal helpers must agree with the oracle's shape.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rootward::scope::ScopeChain;
use rootward_cell::ValueCell;

const KEYS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

#[derive(Arbitrary, Debug, Clone, Copy)]
enum Op {
    Extend { key: u8, value: i16 },
    Pop,
    Resolve { key: u8 },
    ResolveAbsent,
    CheckShape,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut chain: ScopeChain<i16> = ScopeChain::root();
    // Oracle: entries in push order, newest last.
    let mut oracle: Vec<(usize, i16)> = Vec::new();

    for op in ops {
        match op {
            Op::Extend { key, value } => {
                let key = usize::from(key) % KEYS.len();
                chain = chain.extend(KEYS[key], ValueCell::new(value));
                oracle.push((key, value));
            }
            Op::Pop => {
                if let Some(parent) = chain.parent() {
                    chain = parent;
                    oracle.pop();
                } else {
                    assert!(chain.is_root());
                    assert!(oracle.is_empty());
                }
            }
            Op::Resolve { key } => {
                let key = usize::from(key) % KEYS.len();
                let got = chain.resolve(KEYS[key]).map(|cell| cell.get());
                let want = oracle
                    .iter()
                    .rev()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v);
                assert_eq!(got, want, "resolve({}) diverged from oracle", KEYS[key]);
            }
            Op::ResolveAbsent => {
                assert!(chain.resolve("never-bound").is_none());
                assert!(chain.resolve("").is_none());
            }
            Op::CheckShape => {
                assert_eq!(chain.depth(), oracle.len());
                assert_eq!(chain.is_root(), oracle.is_empty());
                assert_eq!(
                    chain.local_key(),
                    oracle.last().map(|(k, _)| KEYS[*k])
                );
                let keys: Vec<&str> = chain.keys().collect();
                let want: Vec<&str> = oracle.iter().rev().map(|(k, _)| KEYS[*k]).collect();
                assert_eq!(keys, want);
            }
        }

        // Identity survives cloning at every step.
        assert!(chain.same(&chain.clone()));
    }
});

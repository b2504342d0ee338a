#![forbid(unsafe_code)]

//! Hierarchical key/value propagation with fine-grained change
//! subscriptions.
//!
//! Values flow from providers down a tree to consumers without threading
//! them through intermediate levels. Each provider is a [`BindingNode`]
//! that owns one observable cell and extends the ambient [`ScopeChain`]
//! with a key-to-cell entry; each consumer is a [`LookupSubscriber`] (or a
//! one-shot [`lookup::read`]) that resolves its key against the nearest
//! enclosing provider and listens for changes on exactly that cell.
//!
//! The design splits context propagation into two independent channels:
//!
//! - **Structure** (which cell does a key resolve to?) changes rarely, when
//!   providers mount, unmount, or re-key. It is communicated by handing
//!   consumers a new scope chain.
//! - **Value** (what does that cell hold?) changes often. It is
//!   communicated through cell subscriptions and never rebuilds any chain.
//!
//! Keeping the two apart is what makes value updates cheap: a provider
//! re-evaluated with an unchanged key and an unchanged parent chain hands
//! back the *same* chain object, so nothing downstream re-resolves.
//!
//! ```
//! use rootward::binding::BindingNode;
//! use rootward::lookup::LookupSubscriber;
//! use rootward::scope::ScopeChain;
//!
//! let root = ScopeChain::root();
//! let mut provider = BindingNode::new();
//! let scope = provider.evaluate(&root, "theme", "dark");
//!
//! let mut consumer = LookupSubscriber::new("theme", |v: &&str| {
//!     println!("theme is now {v}");
//! });
//! assert_eq!(consumer.evaluate(&scope), Some("dark"));
//!
//! provider.cell().set("light"); // consumer's callback fires here
//! ```

pub mod binding;
pub mod lookup;
pub mod scope;

pub use binding::BindingNode;
pub use lookup::LookupSubscriber;
pub use rootward_cell::{Subscription, ValueCell};
pub use scope::ScopeChain;

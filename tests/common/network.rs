//! [`ChannelNetwork`], an in-process [`Network`] connecting replicas that run on their own threads.

use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
};

use chained_hotstuff::{
    networking::{messages::Message, network::Network},
    types::validator_set::{ValidatorSet, VerifyingKey},
};

type Envelope = (VerifyingKey, Message);

/// One replica's end of a set of channels, one inbox per replica.
///
/// Every send is a non-blocking push into the recipient's inbox. Broadcasts reach the validators the
/// replica was told about in [`init_validator_set`](Network::init_validator_set), or every connected
/// replica before that. Messages to replicas that have shut down are silently lost.
#[derive(Clone)]
pub(crate) struct ChannelNetwork {
    me: VerifyingKey,
    inboxes: Arc<HashMap<VerifyingKey, Sender<Envelope>>>,
    validators: Option<ValidatorSet>,
    inbox: Arc<Mutex<Receiver<Envelope>>>,
}

impl ChannelNetwork {
    fn deliver(&self, peer: &VerifyingKey, message: Message) {
        if let Some(inbox) = self.inboxes.get(peer) {
            let _ = inbox.send((self.me, message));
        }
    }
}

impl Network for ChannelNetwork {
    fn init_validator_set(&mut self, validator_set: ValidatorSet) {
        self.validators = Some(validator_set);
    }

    fn broadcast(&mut self, message: Message) {
        let peers: Vec<VerifyingKey> = match &self.validators {
            Some(validators) => validators.validators().copied().collect(),
            None => self.inboxes.keys().copied().collect(),
        };
        for peer in peers.iter().filter(|peer| **peer != self.me) {
            self.deliver(peer, message.clone());
        }
    }

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        self.deliver(&peer, message);
    }

    fn recv(&mut self) -> Option<Envelope> {
        self.inbox.lock().unwrap().try_recv().ok()
    }
}

/// Connect the replicas owning `keys`, returning each one's end in the same order.
pub(crate) fn channel_network(keys: &[VerifyingKey]) -> Vec<ChannelNetwork> {
    let (senders, receivers): (HashMap<_, _>, Vec<_>) = keys
        .iter()
        .map(|key| {
            let (sender, receiver) = mpsc::channel();
            ((*key, sender), receiver)
        })
        .unzip();
    let inboxes = Arc::new(senders);

    keys.iter()
        .zip(receivers)
        .map(|(key, receiver)| ChannelNetwork {
            me: *key,
            inboxes: inboxes.clone(),
            validators: None,
            inbox: Arc::new(Mutex::new(receiver)),
        })
        .collect()
}

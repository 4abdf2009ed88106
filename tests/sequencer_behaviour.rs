//! Behavioural scenarios for the provisioning sequencer.

mod sequencer;

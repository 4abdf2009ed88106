//! Provisioning sequencer with guaranteed cleanup.
//!
//! A run authenticates, creates a resource group and a first public IP,
//! creates a VM bound to that address, moves the VM to a second address,
//! detaches it and deletes the detached address. Whatever happens on the way,
//! the resource group recorded in the run context is deleted afterwards, so
//! every resource the run created is reclaimed by a single cascading delete.

mod error;
mod plan;
mod state;


use std::time::Instant;

use tracing::{error, info, warn};

use crate::backend::{
    Backend, BackendFuture, NetworkInterfaceHandle, PublicIpAddress, VirtualMachineHandle,
};

pub use error::{CleanupOutcome, RunError, RunFailure, Step};
pub use plan::{RunPlan, SUBNET_NAME};
pub use state::{RunContext, RunState};

/// Outcome of a run whose forward sequence completed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    /// First address as read from the VM after creation.
    pub first_address: PublicIpAddress,
    /// Second address as read from the VM after rebinding.
    pub second_address: PublicIpAddress,
    /// Outcome of the cleanup stage.
    pub cleanup: CleanupOutcome,
    /// States visited during the run, oldest first.
    pub history: Vec<RunState>,
}

struct ObservedAddresses {
    first: PublicIpAddress,
    second: PublicIpAddress,
}

/// Drives one provisioning run against a backend.
#[derive(Debug)]
pub struct ProvisioningSequencer<B> {
    backend: B,
    plan: RunPlan,
}

impl<B> ProvisioningSequencer<B>
where
    B: Backend,
{
    /// Creates a sequencer for `plan`.
    #[must_use]
    pub const fn new(backend: B, plan: RunPlan) -> Self {
        Self { backend, plan }
    }

    /// Backend the sequencer drives.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Plan the sequencer executes.
    #[must_use]
    pub const fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Runs the forward sequence, then deletes the resource group.
    ///
    /// Cleanup runs after success, partial success and failure alike. A
    /// cleanup failure is logged and recorded in the returned outcome; it
    /// never replaces the forward result.
    ///
    /// # Errors
    ///
    /// Returns [`RunFailure`] carrying the error that aborted the forward
    /// sequence together with the cleanup outcome.
    pub async fn execute(&self) -> Result<RunReport, RunFailure<B::Error>> {
        let mut context = RunContext::new();
        let forward = self.forward(&mut context).await;
        if let Err(err) = &forward {
            error!(error = %err, state = %context.state(), "provisioning sequence aborted");
        }
        let cleanup = self.teardown(&mut context).await;
        let history = context.history().to_vec();
        match forward {
            Ok(addresses) => Ok(RunReport {
                first_address: addresses.first,
                second_address: addresses.second,
                cleanup,
                history,
            }),
            Err(error) => Err(RunFailure {
                error,
                cleanup,
                history,
            }),
        }
    }

    /// Deletes the resource group recorded in `context`, if any.
    ///
    /// The handle is taken out of the context, so calling this twice issues
    /// at most one delete.
    pub async fn teardown(&self, context: &mut RunContext) -> CleanupOutcome {
        let Some(group) = context.take_resource_group() else {
            info!("no resource group was created; nothing to clean up");
            return CleanupOutcome::NothingCreated;
        };
        context.advance(RunState::CleaningUp);
        let started = Instant::now();
        match self.backend.delete_resource_group(&group.name).await {
            Ok(()) => {
                context.advance(RunState::GroupDeleted);
                info!(
                    resource_group = %group.name,
                    elapsed_ms = elapsed_ms(started),
                    "deleted resource group"
                );
                CleanupOutcome::Deleted {
                    resource_group: group.name,
                }
            }
            Err(err) => {
                context.advance(RunState::CleanupFailed);
                warn!(
                    resource_group = %group.name,
                    error = %err,
                    "failed to delete resource group; resources may remain"
                );
                CleanupOutcome::Failed {
                    resource_group: group.name,
                    message: err.to_string(),
                }
            }
        }
    }

    async fn forward(
        &self,
        context: &mut RunContext,
    ) -> Result<ObservedAddresses, RunError<B::Error>> {
        self.step(Step::Authenticate, self.backend.authenticate())
            .await
            .map_err(|err| match err {
                RunError::Provider { source, .. } => RunError::Authentication(source),
                other => other,
            })?;

        let names = &self.plan.names;
        let group = self
            .step(
                Step::CreateResourceGroup,
                self.backend
                    .create_resource_group(&names.resource_group, &self.plan.location),
            )
            .await?;
        info!(resource_group = %group.name, id = %group.id, "created resource group");
        context.record_resource_group(group);

        let (vm, first) = self.provision_vm(context).await?;
        let (vm, second) = self.swap_address(context, vm).await?;
        self.detach_and_delete(context, vm, &second).await?;
        Ok(ObservedAddresses { first, second })
    }

    async fn provision_vm(
        &self,
        context: &mut RunContext,
    ) -> Result<(VirtualMachineHandle, PublicIpAddress), RunError<B::Error>> {
        let address_request = self.plan.first_address_request();
        let first = self
            .step(
                Step::CreateFirstAddress,
                self.backend.create_public_ip(&address_request),
            )
            .await?;
        info!(name = %first.name, fqdn = ?first.fqdn, "created first public IP");
        context.advance(RunState::FirstAddressCreated);

        let vm_request = self.plan.vm_request(&first.id);
        let vm = self
            .step(
                Step::CreateVirtualMachine,
                self.backend.create_virtual_machine(&vm_request),
            )
            .await?;
        info!(vm = %vm.name, nic = %vm.primary_nic.name, "created virtual machine");
        context.observe_binding(vm.primary_nic.primary_public_ip_id.clone());
        context.advance(RunState::VmCreated);

        let current = self
            .step(Step::ReadAddress, self.backend.primary_public_ip(&vm))
            .await?
            .ok_or_else(|| RunError::MissingPublicIp {
                vm: vm.name.clone(),
            })?;
        log_address("public IP after creation", &current);
        Ok((vm, current))
    }

    async fn swap_address(
        &self,
        context: &mut RunContext,
        created: VirtualMachineHandle,
    ) -> Result<(VirtualMachineHandle, PublicIpAddress), RunError<B::Error>> {
        let request = self.plan.second_address_request();
        let second = self
            .step(
                Step::CreateSecondAddress,
                self.backend.create_public_ip(&request),
            )
            .await?;
        info!(name = %second.name, fqdn = ?second.fqdn, "created second public IP");
        context.advance(RunState::SecondAddressCreated);

        let nic = self
            .step(
                Step::Rebind,
                self.backend
                    .update_primary_public_ip(&created.primary_nic, Some(&second)),
            )
            .await?;
        context.observe_binding(nic.primary_public_ip_id.clone());
        context.advance(RunState::Rebound);

        let vm = self.refresh(context, &created).await?;
        let current = self
            .step(Step::ReadAddress, self.backend.primary_public_ip(&vm))
            .await?;
        match current {
            Some(address) if address.id.eq_ignore_ascii_case(&second.id) => {
                log_address("public IP after rebind", &address);
                Ok((vm, address))
            }
            other => Err(RunError::RebindNotObserved {
                nic: vm.primary_nic.name.clone(),
                expected: second.id,
                observed: other.map_or_else(|| String::from("no address"), |found| found.id),
            }),
        }
    }

    async fn detach_and_delete(
        &self,
        context: &mut RunContext,
        rebound: VirtualMachineHandle,
        detached: &PublicIpAddress,
    ) -> Result<(), RunError<B::Error>> {
        let nic = self
            .step(
                Step::Detach,
                self.backend
                    .update_primary_public_ip(&rebound.primary_nic, None),
            )
            .await?;
        context.observe_binding(nic.primary_public_ip_id.clone());
        if context
            .bound_address()
            .is_some_and(|bound| bound.eq_ignore_ascii_case(&detached.id))
        {
            return Err(RunError::StillBound {
                public_ip: detached.id.clone(),
            });
        }

        let vm = self.refresh(context, &rebound).await?;
        check_detached(&vm.primary_nic)?;
        info!(nic = %vm.primary_nic.name, "interface has no public IP");
        context.advance(RunState::Detached);

        self.step(
            Step::DeleteAddress,
            self.backend.delete_public_ip(&detached.id),
        )
        .await?;
        info!(name = %detached.name, "deleted detached public IP");
        context.advance(RunState::AddressDeleted);
        Ok(())
    }

    async fn refresh(
        &self,
        context: &mut RunContext,
        vm: &VirtualMachineHandle,
    ) -> Result<VirtualMachineHandle, RunError<B::Error>> {
        let fresh = self
            .step(Step::Refresh, self.backend.refresh_virtual_machine(vm))
            .await?;
        context.observe_binding(fresh.primary_nic.primary_public_ip_id.clone());
        Ok(fresh)
    }

    async fn step<'a, T>(
        &self,
        step: Step,
        call: BackendFuture<'a, T, B::Error>,
    ) -> Result<T, RunError<B::Error>> {
        let started = Instant::now();
        info!(%step, "starting");
        match call.await {
            Ok(value) => {
                info!(%step, elapsed_ms = elapsed_ms(started), "finished");
                Ok(value)
            }
            Err(source) => Err(RunError::Provider { step, source }),
        }
    }
}

fn check_detached<E>(nic: &NetworkInterfaceHandle) -> Result<(), RunError<E>>
where
    E: std::error::Error + 'static,
{
    if let Some(public_ip) = &nic.primary_public_ip_id {
        return Err(RunError::DetachNotObserved {
            nic: nic.name.clone(),
            public_ip: public_ip.clone(),
        });
    }
    Ok(())
}

fn log_address(message: &'static str, address: &PublicIpAddress) {
    info!(
        name = %address.name,
        ip_address = address.ip_address.as_deref().unwrap_or("<unallocated>"),
        fqdn = address.fqdn.as_deref().unwrap_or("<none>"),
        dns_label = address.dns_label.as_deref().unwrap_or("<none>"),
        "{message}"
    );
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

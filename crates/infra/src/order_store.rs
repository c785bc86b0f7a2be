//! Order storage seam.
//!
//! Orders are event-sourced; [`EventSourcedOrderStore`] is the order store
//! over the event store. Listing a vendor's orders is a scan over every order
//! stream, which is what the ledger folds from.

use bazaar_core::{AggregateId, DomainError, ExpectedVersion, OrderId, VendorId};
use bazaar_orders::{FulfillmentStatus, Order, OrderEvent, AGGREGATE_TYPE};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, UncommittedEvent};

pub trait OrderStore: Send + Sync {
    fn get(&self, order_id: OrderId) -> Result<Option<Order>, DispatchError>;

    /// Append new events of an order against the version they were decided at
    /// and return the updated order.
    fn put(
        &self,
        order_id: OrderId,
        expected_version: ExpectedVersion,
        events: &[OrderEvent],
    ) -> Result<Order, DispatchError>;

    /// Orders with a sub-order for `vendor_id`.
    fn list_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>, DispatchError>;

    /// Orders whose `vendor_id` sub-order is delivered.
    fn list_delivered_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>, DispatchError> {
        Ok(self
            .list_for_vendor(vendor_id)?
            .into_iter()
            .filter(|o| {
                o.sub_order(vendor_id)
                    .is_some_and(|s| s.status == FulfillmentStatus::Delivered)
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct EventSourcedOrderStore<S> {
    dispatcher: CommandDispatcher<S>,
}

impl<S> EventSourcedOrderStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
        }
    }
}

fn make_order(id: AggregateId) -> Order {
    Order::empty(id.into())
}

impl<S> OrderStore for EventSourcedOrderStore<S>
where
    S: EventStore,
{
    fn get(&self, order_id: OrderId) -> Result<Option<Order>, DispatchError> {
        let order = self.dispatcher.load(order_id.into(), AGGREGATE_TYPE, make_order)?;
        Ok(order.exists().then_some(order))
    }

    fn put(
        &self,
        order_id: OrderId,
        expected_version: ExpectedVersion,
        events: &[OrderEvent],
    ) -> Result<Order, DispatchError> {
        let aggregate_id = AggregateId::from(order_id);
        let uncommitted = events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, uuid::Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        if !uncommitted.is_empty() {
            self.dispatcher.store().append(uncommitted, expected_version)?;
        }

        self.get(order_id)?
            .ok_or_else(|| DomainError::not_found("order", order_id).into())
    }

    fn list_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>, DispatchError> {
        Ok(self
            .dispatcher
            .load_all(AGGREGATE_TYPE, make_order)?
            .into_iter()
            .filter(|o| o.sub_order(vendor_id).is_some())
            .collect())
    }
}

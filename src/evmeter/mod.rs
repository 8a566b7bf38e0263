pub mod charger;
pub mod packet;

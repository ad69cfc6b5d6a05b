//! Activities registered by the PKE worker

pub mod delete;

pub use delete::{
    DeletableResource, DeleteLoadBalancerActivity, DeleteNsgActivity, DeletePublicIpActivity,
    DeleteResourceActivity, DeleteResourceActivityInput, DeleteRouteTableActivity,
    DeleteVmssActivity, DeleteVnetActivity, LoadBalancer, PublicIpAddress, RouteTable, ScaleSet,
    SecurityGroup, VirtualNetwork,
};

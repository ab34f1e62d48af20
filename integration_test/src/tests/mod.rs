mod test_rpcstream;

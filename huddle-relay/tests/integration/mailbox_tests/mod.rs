mod test_backlog_replay;
